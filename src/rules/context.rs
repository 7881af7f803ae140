// =============================================================================
// Rule Context — the named-variable environment for one evaluation
// =============================================================================
//
// Constructed from a parsed request plus derived fields immediately before
// evaluation; lives exactly as long as that evaluation. Concurrent workers
// each build their own context, so nothing here is shared or locked.
// =============================================================================

use crate::request::Request;
use crate::rules::expr::{Symbols, Value};

/// Snapshot of every variable bindable into rule expressions.
#[derive(Debug, Clone)]
pub struct RuleContext {
    // ── Transaction ─────────────────────────────────────────────────────
    pub amount: f64,
    pub currency: String,
    pub merchant_id: String,
    pub merchant_category: f64,
    pub pos_entry_mode: String,

    // ── Card ────────────────────────────────────────────────────────────
    pub card_token: String,
    pub issuer_country: String,
    pub card_brand: String,

    // ── Device ──────────────────────────────────────────────────────────
    pub ip_address: String,
    pub device_fingerprint: String,
    pub user_agent: String,

    // ── Customer ────────────────────────────────────────────────────────
    pub customer_id: String,
    pub customer_risk_score: f64,
    pub account_age_days: f64,

    // ── Derived ─────────────────────────────────────────────────────────
    pub merchant_risk: f64,
    pub hourly_count: f64,
    pub amount_sum: f64,
    /// 1.0 when the pattern matcher reported a blacklist hit on ip_address.
    pub ip_blacklist_match: f64,
}

impl RuleContext {
    /// Build a context from a validated request. Derived fields start at
    /// their defaults; the orchestrator overrides them before evaluation.
    pub fn from_request(request: &Request) -> Self {
        Self {
            amount: request.transaction.amount,
            currency: request.transaction.currency.clone(),
            merchant_id: request.transaction.merchant_id.clone(),
            merchant_category: f64::from(request.transaction.merchant_category),
            pos_entry_mode: request.transaction.pos_entry_mode.clone(),

            card_token: request.card.token.clone(),
            issuer_country: request.card.issuer_country.clone(),
            card_brand: request.card.card_brand.clone(),

            ip_address: request.device.ip.clone(),
            device_fingerprint: request.device.fingerprint.clone(),
            user_agent: request.device.user_agent.clone(),

            customer_id: request.customer.id.clone(),
            customer_risk_score: request.customer.risk_score,
            account_age_days: f64::from(request.customer.account_age_days),

            merchant_risk: 0.0,
            hourly_count: 1.0,
            amount_sum: request.transaction.amount,
            ip_blacklist_match: 0.0,
        }
    }

    /// A context is evaluable when the identifying fields are present and the
    /// amount is positive.
    pub fn is_evaluable(&self) -> bool {
        !self.customer_id.is_empty()
            && !self.merchant_id.is_empty()
            && !self.currency.is_empty()
            && self.amount > 0.0
    }

    /// Every bindable variable name, for diagnostics and validation.
    pub fn variable_names() -> &'static [&'static str] {
        &[
            "amount",
            "currency",
            "merchant_id",
            "merchant_category",
            "pos_entry_mode",
            "card_token",
            "issuer_country",
            "card_brand",
            "ip_address",
            "device_fingerprint",
            "user_agent",
            "customer_id",
            "customer_risk_score",
            "account_age_days",
            "merchant_risk",
            "hourly_count",
            "amount_sum",
            "ip_blacklist_match",
        ]
    }
}

impl Symbols for RuleContext {
    fn lookup(&self, name: &str) -> Option<Value<'_>> {
        let value = match name {
            "amount" => Value::Num(self.amount),
            "currency" => Value::Str(&self.currency),
            "merchant_id" => Value::Str(&self.merchant_id),
            "merchant_category" => Value::Num(self.merchant_category),
            "pos_entry_mode" => Value::Str(&self.pos_entry_mode),
            "card_token" => Value::Str(&self.card_token),
            "issuer_country" => Value::Str(&self.issuer_country),
            "card_brand" => Value::Str(&self.card_brand),
            "ip_address" => Value::Str(&self.ip_address),
            "device_fingerprint" => Value::Str(&self.device_fingerprint),
            "user_agent" => Value::Str(&self.user_agent),
            "customer_id" => Value::Str(&self.customer_id),
            "customer_risk_score" => Value::Num(self.customer_risk_score),
            "account_age_days" => Value::Num(self.account_age_days),
            "merchant_risk" => Value::Num(self.merchant_risk),
            "hourly_count" => Value::Num(self.hourly_count),
            "amount_sum" => Value::Num(self.amount_sum),
            "ip_blacklist_match" => Value::Num(self.ip_blacklist_match),
            _ => return None,
        };
        Some(value)
    }
}
