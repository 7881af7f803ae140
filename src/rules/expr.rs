// =============================================================================
// Rule Expression Language — compile once, evaluate per request
// =============================================================================
//
// Arithmetic over real numbers, relational and logical operators, string
// equality and a `contains` infix operator, over the named variables of the
// rule context. An expression yields a real number; boolean results are
// 1.0 / 0.0, and a value is truthy when it exceeds 0.5.
//
// Grammar (precedence low to high):
//
//   or          := and ( "||" and )*
//   and         := cmp_eq ( "&&" cmp_eq )*
//   cmp_eq      := cmp_rel ( ("==" | "!=" | "contains") cmp_rel )*
//   cmp_rel     := additive ( ("<" | "<=" | ">" | ">=") additive )*
//   additive    := multiplicative ( ("+" | "-") multiplicative )*
//   multiplicative := unary ( ("*" | "/" | "%") unary )*
//   unary       := ("!" | "-") unary | primary
//   primary     := number | string | "true" | "false" | ident | "(" or ")"
//
// Compilation happens once per worker per rule; evaluation binds variables
// through the `Symbols` trait so the context owns its data and evaluation
// borrows it.
// =============================================================================

use thiserror::Error;

// =============================================================================
// Values & symbols
// =============================================================================

/// A runtime value: a real number or a borrowed string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Num(f64),
    Str(&'a str),
}

impl Value<'_> {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Num(_) => "number",
            Self::Str(_) => "string",
        }
    }
}

/// Variable environment an expression evaluates against.
pub trait Symbols {
    fn lookup(&self, name: &str) -> Option<Value<'_>>;
}

/// Simple map-backed environment for tests and ad-hoc evaluation.
#[derive(Debug, Default)]
pub struct MapSymbols {
    nums: std::collections::HashMap<String, f64>,
    strs: std::collections::HashMap<String, String>,
}

impl MapSymbols {
    pub fn num(mut self, name: &str, value: f64) -> Self {
        self.nums.insert(name.to_string(), value);
        self
    }

    pub fn str(mut self, name: &str, value: &str) -> Self {
        self.strs.insert(name.to_string(), value.to_string());
        self
    }
}

impl Symbols for MapSymbols {
    fn lookup(&self, name: &str) -> Option<Value<'_>> {
        if let Some(&n) = self.nums.get(name) {
            return Some(Value::Num(n));
        }
        self.strs.get(name).map(|s| Value::Str(s.as_str()))
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Failure turning source text into an expression.
#[derive(Debug, Clone, Error)]
#[error("compile error at byte {position}: {message}")]
pub struct CompileError {
    pub position: usize,
    pub message: String,
}

/// Failure evaluating a compiled expression against a context.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("type mismatch: {op} applied to {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("expression produced a string where a number was required")]
    NonNumericResult,
}

// =============================================================================
// AST
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Contains,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "&&",
            Self::Or => "||",
            Self::Contains => "contains",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// A compiled expression.
#[derive(Debug, Clone)]
pub enum Expr {
    Num(f64),
    Str(String),
    Var(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// A value is truthy when it exceeds 0.5. This is the same threshold that
/// decides whether a rule is triggered.
pub const TRUTH_THRESHOLD: f64 = 0.5;

fn bool_num(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

impl Expr {
    /// Compile source text into an expression.
    pub fn compile(source: &str) -> Result<Self, CompileError> {
        let tokens = lex(source)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            source_len: source.len(),
        };
        let expr = parser.parse_or()?;
        if let Some(tok) = parser.peek() {
            return Err(CompileError {
                position: tok.position,
                message: format!("unexpected trailing token {}", tok.kind.describe()),
            });
        }
        Ok(expr)
    }

    /// Evaluate to a raw value against `symbols`.
    pub fn eval<'a>(&'a self, symbols: &'a dyn Symbols) -> Result<Value<'a>, EvalError> {
        match self {
            Self::Num(n) => Ok(Value::Num(*n)),
            Self::Str(s) => Ok(Value::Str(s.as_str())),
            Self::Var(name) => symbols
                .lookup(name)
                .ok_or_else(|| EvalError::UnknownVariable(name.clone())),
            Self::Unary { op, operand } => {
                let v = operand.eval(symbols)?;
                match (*op, v) {
                    (UnaryOp::Neg, Value::Num(n)) => Ok(Value::Num(-n)),
                    (UnaryOp::Not, Value::Num(n)) => Ok(Value::Num(bool_num(n <= TRUTH_THRESHOLD))),
                    (UnaryOp::Neg, v) => Err(EvalError::TypeMismatch {
                        op: "-",
                        lhs: v.type_name(),
                        rhs: "nothing",
                    }),
                    (UnaryOp::Not, v) => Err(EvalError::TypeMismatch {
                        op: "!",
                        lhs: v.type_name(),
                        rhs: "nothing",
                    }),
                }
            }
            Self::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, symbols),
        }
    }

    /// Evaluate to the final real number; a string result is an error.
    pub fn eval_number(&self, symbols: &dyn Symbols) -> Result<f64, EvalError> {
        match self.eval(symbols)? {
            Value::Num(n) => Ok(n),
            Value::Str(_) => Err(EvalError::NonNumericResult),
        }
    }
}

fn eval_binary<'a>(
    op: BinaryOp,
    lhs: &'a Expr,
    rhs: &'a Expr,
    symbols: &'a dyn Symbols,
) -> Result<Value<'a>, EvalError> {
    // Short-circuit logical operators before evaluating the right side.
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let l = truthy(lhs.eval(symbols)?, op.symbol())?;
        return match (op, l) {
            (BinaryOp::And, false) => Ok(Value::Num(0.0)),
            (BinaryOp::Or, true) => Ok(Value::Num(1.0)),
            _ => {
                let r = truthy(rhs.eval(symbols)?, op.symbol())?;
                Ok(Value::Num(bool_num(r)))
            }
        };
    }

    let l = lhs.eval(symbols)?;
    let r = rhs.eval(symbols)?;

    let mismatch = |op: BinaryOp, l: Value<'_>, r: Value<'_>| EvalError::TypeMismatch {
        op: op.symbol(),
        lhs: l.type_name(),
        rhs: r.type_name(),
    };

    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            match (l, r) {
                (Value::Num(a), Value::Num(b)) => Ok(Value::Num(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Rem => a % b,
                    _ => unreachable!(),
                })),
                (l, r) => Err(mismatch(op, l, r)),
            }
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => match (l, r) {
            (Value::Num(a), Value::Num(b)) => Ok(Value::Num(bool_num(match op {
                BinaryOp::Lt => a < b,
                BinaryOp::Le => a <= b,
                BinaryOp::Gt => a > b,
                BinaryOp::Ge => a >= b,
                _ => unreachable!(),
            }))),
            (l, r) => Err(mismatch(op, l, r)),
        },
        BinaryOp::Eq | BinaryOp::Ne => {
            let equal = match (l, r) {
                (Value::Num(a), Value::Num(b)) => a == b,
                (Value::Str(a), Value::Str(b)) => a == b,
                (l, r) => return Err(mismatch(op, l, r)),
            };
            Ok(Value::Num(bool_num(if op == BinaryOp::Eq {
                equal
            } else {
                !equal
            })))
        }
        BinaryOp::Contains => match (l, r) {
            (Value::Str(haystack), Value::Str(needle)) => {
                Ok(Value::Num(bool_num(haystack.contains(needle))))
            }
            (l, r) => Err(mismatch(op, l, r)),
        },
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn truthy(value: Value<'_>, op: &'static str) -> Result<bool, EvalError> {
    match value {
        Value::Num(n) => Ok(n > TRUTH_THRESHOLD),
        Value::Str(_) => Err(EvalError::TypeMismatch {
            op,
            lhs: "string",
            rhs: "truth test",
        }),
    }
}

// =============================================================================
// Lexer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Bang,
    Contains,
    LParen,
    RParen,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            Self::Number(n) => format!("number {n}"),
            Self::Str(s) => format!("string '{s}'"),
            Self::Ident(s) => format!("identifier '{s}'"),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::EqEq => "==",
            Self::NotEq => "!=",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Bang => "!",
            Self::Contains => "contains",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::Number(_) | Self::Str(_) | Self::Ident(_) => "",
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn lex(source: &str) -> Result<Vec<Token>, CompileError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let position = i;

        match b {
            b' ' | b'\t' | b'\r' | b'\n' => {
                i += 1;
            }
            b'(' => {
                tokens.push(Token { kind: TokenKind::LParen, position });
                i += 1;
            }
            b')' => {
                tokens.push(Token { kind: TokenKind::RParen, position });
                i += 1;
            }
            b'+' => {
                tokens.push(Token { kind: TokenKind::Plus, position });
                i += 1;
            }
            b'-' => {
                tokens.push(Token { kind: TokenKind::Minus, position });
                i += 1;
            }
            b'*' => {
                tokens.push(Token { kind: TokenKind::Star, position });
                i += 1;
            }
            b'/' => {
                tokens.push(Token { kind: TokenKind::Slash, position });
                i += 1;
            }
            b'%' => {
                tokens.push(Token { kind: TokenKind::Percent, position });
                i += 1;
            }
            b'<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token { kind: TokenKind::Le, position });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Lt, position });
                    i += 1;
                }
            }
            b'>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token { kind: TokenKind::Ge, position });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Gt, position });
                    i += 1;
                }
            }
            b'=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token { kind: TokenKind::EqEq, position });
                    i += 2;
                } else {
                    return Err(CompileError {
                        position,
                        message: "single '=' is not an operator; use '=='".to_string(),
                    });
                }
            }
            b'!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token { kind: TokenKind::NotEq, position });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Bang, position });
                    i += 1;
                }
            }
            b'&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push(Token { kind: TokenKind::AndAnd, position });
                    i += 2;
                } else {
                    return Err(CompileError {
                        position,
                        message: "single '&' is not an operator; use '&&'".to_string(),
                    });
                }
            }
            b'|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push(Token { kind: TokenKind::OrOr, position });
                    i += 2;
                } else {
                    return Err(CompileError {
                        position,
                        message: "single '|' is not an operator; use '||'".to_string(),
                    });
                }
            }
            b'\'' | b'"' => {
                let quote = b;
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && bytes[j] != quote {
                    j += 1;
                }
                if j >= bytes.len() {
                    return Err(CompileError {
                        position,
                        message: "unterminated string literal".to_string(),
                    });
                }
                let text = source[start..j].to_string();
                tokens.push(Token { kind: TokenKind::Str(text), position });
                i = j + 1;
            }
            b'0'..=b'9' | b'.' => {
                let start = i;
                let mut j = i;
                while j < bytes.len() && (bytes[j].is_ascii_digit() || bytes[j] == b'.') {
                    j += 1;
                }
                let text = &source[start..j];
                let value: f64 = text.parse().map_err(|_| CompileError {
                    position,
                    message: format!("malformed number '{text}'"),
                })?;
                tokens.push(Token { kind: TokenKind::Number(value), position });
                i = j;
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let start = i;
                let mut j = i;
                while j < bytes.len()
                    && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_')
                {
                    j += 1;
                }
                let word = &source[start..j];
                let kind = match word {
                    "true" => TokenKind::Number(1.0),
                    "false" => TokenKind::Number(0.0),
                    "contains" => TokenKind::Contains,
                    _ => TokenKind::Ident(word.to_string()),
                };
                tokens.push(Token { kind, position });
                i = j;
            }
            other => {
                return Err(CompileError {
                    position,
                    message: format!("unexpected character '{}'", other as char),
                });
            }
        }
    }

    Ok(tokens)
}

// =============================================================================
// Parser (recursive descent, one level per precedence tier)
// =============================================================================

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    source_len: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn error_here(&self, message: impl Into<String>) -> CompileError {
        let position = self
            .peek()
            .map(|t| t.position)
            .unwrap_or(self.source_len);
        CompileError {
            position,
            message: message.into(),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::OrOr)) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_equality()?;
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::AndAnd)) {
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::EqEq) => BinaryOp::Eq,
                Some(TokenKind::NotEq) => BinaryOp::Ne,
                Some(TokenKind::Contains) => BinaryOp::Contains,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Lt) => BinaryOp::Lt,
                Some(TokenKind::Le) => BinaryOp::Le,
                Some(TokenKind::Gt) => BinaryOp::Gt,
                Some(TokenKind::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                Some(TokenKind::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Bang) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                })
            }
            Some(TokenKind::Minus) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let Some(token) = self.advance().cloned() else {
            return Err(self.error_here("unexpected end of expression"));
        };

        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Num(n)),
            TokenKind::Str(s) => Ok(Expr::Str(s)),
            TokenKind::Ident(name) => Ok(Expr::Var(name)),
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                match self.advance().map(|t| &t.kind) {
                    Some(TokenKind::RParen) => Ok(inner),
                    _ => Err(CompileError {
                        position: token.position,
                        message: "unclosed parenthesis".to_string(),
                    }),
                }
            }
            other => Err(CompileError {
                position: token.position,
                message: format!("unexpected token {}", other.describe()),
            }),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn eval_num(src: &str, syms: &dyn Symbols) -> f64 {
        Expr::compile(src).unwrap().eval_number(syms).unwrap()
    }

    fn empty() -> MapSymbols {
        MapSymbols::default()
    }

    // ---- arithmetic ------------------------------------------------------

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(eval_num("2 + 3 * 4", &empty()), 14.0);
        assert_eq!(eval_num("(2 + 3) * 4", &empty()), 20.0);
        assert_eq!(eval_num("10 - 4 - 3", &empty()), 3.0);
        assert_eq!(eval_num("7 % 4", &empty()), 3.0);
        assert_eq!(eval_num("-3 + 5", &empty()), 2.0);
    }

    #[test]
    fn decimal_literals() {
        assert!((eval_num("0.5 + 0.25", &empty()) - 0.75).abs() < 1e-12);
    }

    // ---- comparisons & logic ---------------------------------------------

    #[test]
    fn relational_results_are_zero_or_one() {
        assert_eq!(eval_num("3 > 2", &empty()), 1.0);
        assert_eq!(eval_num("3 < 2", &empty()), 0.0);
        assert_eq!(eval_num("2 >= 2", &empty()), 1.0);
        assert_eq!(eval_num("2 <= 1", &empty()), 0.0);
    }

    #[test]
    fn logical_operators() {
        assert_eq!(eval_num("1 > 0 && 2 > 1", &empty()), 1.0);
        assert_eq!(eval_num("1 > 0 && 2 < 1", &empty()), 0.0);
        assert_eq!(eval_num("1 < 0 || 2 > 1", &empty()), 1.0);
        assert_eq!(eval_num("!(1 > 0)", &empty()), 0.0);
        assert_eq!(eval_num("true && !false", &empty()), 1.0);
    }

    #[test]
    fn logic_binds_looser_than_comparison() {
        // Must parse as (a > 1) && (b < 2), not a > (1 && b) < 2.
        let syms = MapSymbols::default().num("a", 5.0).num("b", 1.0);
        assert_eq!(eval_num("a > 1 && b < 2", &syms), 1.0);
    }

    #[test]
    fn short_circuit_skips_rhs_errors() {
        // RHS references an unknown variable but must never be evaluated.
        assert_eq!(eval_num("1 < 0 && missing_var > 1", &empty()), 0.0);
        assert_eq!(eval_num("1 > 0 || missing_var > 1", &empty()), 1.0);
    }

    // ---- variables & strings ---------------------------------------------

    #[test]
    fn variable_binding() {
        let syms = MapSymbols::default()
            .num("amount", 15_000.0)
            .num("customer_risk_score", 80.0);
        assert_eq!(eval_num("amount > 10000", &syms), 1.0);
        assert_eq!(
            eval_num("amount > 10000 && customer_risk_score > 70", &syms),
            1.0
        );
    }

    #[test]
    fn string_equality_and_contains() {
        let syms = MapSymbols::default()
            .str("currency", "USD")
            .str("user_agent", "curl/8.0");
        assert_eq!(eval_num("currency == 'USD'", &syms), 1.0);
        assert_eq!(eval_num("currency != \"EUR\"", &syms), 1.0);
        assert_eq!(eval_num("user_agent contains 'curl'", &syms), 1.0);
        assert_eq!(eval_num("user_agent contains 'bot'", &syms), 0.0);
    }

    #[test]
    fn unknown_variable_is_eval_error() {
        let expr = Expr::compile("nonexistent > 1").unwrap();
        assert!(matches!(
            expr.eval_number(&empty()),
            Err(EvalError::UnknownVariable(_))
        ));
    }

    #[test]
    fn type_mismatch_is_eval_error() {
        let syms = MapSymbols::default().str("currency", "USD").num("amount", 5.0);
        let expr = Expr::compile("currency + amount").unwrap();
        assert!(matches!(
            expr.eval_number(&syms),
            Err(EvalError::TypeMismatch { .. })
        ));

        let expr = Expr::compile("currency > 'A'").unwrap();
        assert!(expr.eval_number(&syms).is_err());
    }

    #[test]
    fn string_result_is_rejected_at_top_level() {
        let syms = MapSymbols::default().str("currency", "USD");
        let expr = Expr::compile("currency").unwrap();
        assert!(matches!(
            expr.eval_number(&syms),
            Err(EvalError::NonNumericResult)
        ));
    }

    // ---- compile errors --------------------------------------------------

    #[test]
    fn compile_errors() {
        assert!(Expr::compile("").is_err());
        assert!(Expr::compile("1 +").is_err());
        assert!(Expr::compile("(1 + 2").is_err());
        assert!(Expr::compile("a = 1").is_err());
        assert!(Expr::compile("a & b").is_err());
        assert!(Expr::compile("'unterminated").is_err());
        assert!(Expr::compile("1 2").is_err());
        assert!(Expr::compile("amount @ 3").is_err());
    }

    #[test]
    fn compile_error_carries_position() {
        let err = Expr::compile("amount @ 3").unwrap_err();
        assert_eq!(err.position, 7);
    }

    // ---- division edge ---------------------------------------------------

    #[test]
    fn division_follows_ieee() {
        assert!(eval_num("1 / 0", &empty()).is_infinite());
    }
}
