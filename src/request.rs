// =============================================================================
// Request Model — parsed transaction request with per-field validation
// =============================================================================
//
// A decision request carries four sub-records: transaction, card, device,
// customer. Parsing is tolerant (missing fields default) so that validation
// can report the precise offending field as a typed InvalidRequest instead
// of an opaque deserialization failure.
//
// The request is immutable through evaluation and dropped after the
// response is built.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::DecisionError;

/// Hard cap on the request envelope, bytes.
pub const MAX_BODY_BYTES: usize = 8 * 1024;

/// Feature-lookup bucket width, seconds.
const CACHE_BUCKET_SECONDS: i64 = 300;

// =============================================================================
// Sub-records
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(default)]
    pub amount: f64,

    #[serde(default)]
    pub currency: String,

    #[serde(default)]
    pub merchant_id: String,

    #[serde(default)]
    pub merchant_category: u16,

    #[serde(default)]
    pub pos_entry_mode: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardRecord {
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub issuer_country: String,

    #[serde(default)]
    pub card_brand: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceRecord {
    #[serde(default)]
    pub ip: String,

    #[serde(default)]
    pub fingerprint: String,

    #[serde(default)]
    pub user_agent: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerRecord {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub risk_score: f64,

    #[serde(default)]
    pub account_age_days: u32,
}

// =============================================================================
// Request
// =============================================================================

/// A fully parsed decision request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub request_id: String,

    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,

    #[serde(default)]
    pub transaction: TransactionRecord,

    #[serde(default)]
    pub card: CardRecord,

    #[serde(default)]
    pub device: DeviceRecord,

    #[serde(default)]
    pub customer: CustomerRecord,
}

impl Request {
    /// Parse and validate a request document.
    ///
    /// A body that is not valid JSON yields `InvalidDocument`; a body that
    /// parses but violates a field constraint yields `InvalidRequest` naming
    /// the field.
    pub fn parse(body: &str) -> Result<Self, DecisionError> {
        let request: Self = serde_json::from_str(body)
            .map_err(|e| DecisionError::invalid_document(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    /// Apply every per-field length and range check.
    pub fn validate(&self) -> Result<(), DecisionError> {
        fn required(field: &str, value: &str) -> Result<(), DecisionError> {
            if value.is_empty() {
                return Err(DecisionError::invalid_request(format!(
                    "missing required field: {field}"
                )));
            }
            Ok(())
        }

        fn max_len(field: &str, value: &str, max: usize) -> Result<(), DecisionError> {
            if value.len() > max {
                return Err(DecisionError::invalid_request(format!(
                    "{field} exceeds {max} characters"
                )));
            }
            Ok(())
        }

        required("request_id", &self.request_id)?;
        max_len("request_id", &self.request_id, 100)?;

        if self.timestamp <= 0 {
            return Err(DecisionError::invalid_request(
                "timestamp must be a positive epoch-millisecond value",
            ));
        }
        let now_ms = chrono::Utc::now().timestamp_millis();
        if self.timestamp > now_ms + 3_600_000 {
            return Err(DecisionError::invalid_request(
                "timestamp is more than one hour in the future",
            ));
        }

        let t = &self.transaction;
        if !(0.01..=1_000_000.0).contains(&t.amount) {
            return Err(DecisionError::invalid_request(
                "transaction.amount must be in [0.01, 1000000]",
            ));
        }
        if t.currency.len() != 3 {
            return Err(DecisionError::invalid_request(
                "transaction.currency must be a 3-character code",
            ));
        }
        required("transaction.merchant_id", &t.merchant_id)?;
        max_len("transaction.merchant_id", &t.merchant_id, 50)?;
        if t.merchant_category == 0 {
            return Err(DecisionError::invalid_request(
                "transaction.merchant_category must be positive",
            ));
        }
        max_len("transaction.pos_entry_mode", &t.pos_entry_mode, 20)?;

        let c = &self.card;
        max_len("card.token", &c.token, 100)?;
        if !c.issuer_country.is_empty() && c.issuer_country.len() != 2 {
            return Err(DecisionError::invalid_request(
                "card.issuer_country must be a 2-character code",
            ));
        }
        max_len("card.card_brand", &c.card_brand, 20)?;

        let d = &self.device;
        if !d.ip.is_empty() && d.ip.parse::<std::net::IpAddr>().is_err() {
            return Err(DecisionError::invalid_request(
                "device.ip must be a valid IPv4 or IPv6 address",
            ));
        }
        max_len("device.fingerprint", &d.fingerprint, 100)?;
        max_len("device.user_agent", &d.user_agent, 500)?;

        let cu = &self.customer;
        required("customer.id", &cu.id)?;
        max_len("customer.id", &cu.id, 50)?;
        if !(0.0..=100.0).contains(&cu.risk_score) {
            return Err(DecisionError::invalid_request(
                "customer.risk_score must be in [0, 100]",
            ));
        }
        if cu.account_age_days > 36_500 {
            return Err(DecisionError::invalid_request(
                "customer.account_age_days must be at most 36500",
            ));
        }

        Ok(())
    }

    /// Key for feature lookups, bucketed to five-minute windows:
    /// `features:{customer_id}:{merchant_id}:{bucket}`.
    pub fn feature_cache_key(&self) -> String {
        let bucket = self.timestamp / 1000 / CACHE_BUCKET_SECONDS;
        format!(
            "features:{}:{}:{}",
            self.customer.id, self.transaction.merchant_id, bucket
        )
    }

    /// True when the source address is private, loopback, or link-local.
    pub fn has_private_source_ip(&self) -> bool {
        match self.device.ip.parse::<std::net::IpAddr>() {
            Ok(std::net::IpAddr::V4(v4)) => {
                v4.is_private() || v4.is_loopback() || v4.is_link_local()
            }
            Ok(std::net::IpAddr::V6(v6)) => v6.is_loopback(),
            Err(_) => false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_request() -> Request {
        Request {
            request_id: "req-001".into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            transaction: TransactionRecord {
                amount: 100.0,
                currency: "USD".into(),
                merchant_id: "merchant-42".into(),
                merchant_category: 5411,
                pos_entry_mode: "chip".into(),
            },
            card: CardRecord {
                token: "tok_4242".into(),
                issuer_country: "US".into(),
                card_brand: "visa".into(),
            },
            device: DeviceRecord {
                ip: "8.8.8.8".into(),
                fingerprint: "fp-abc".into(),
                user_agent: "Mozilla/5.0".into(),
            },
            customer: CustomerRecord {
                id: "cust-7".into(),
                risk_score: 25.0,
                account_age_days: 365,
            },
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(sample_request().validate().is_ok());
    }

    #[test]
    fn parse_round_trips() {
        let original = sample_request();
        let json = serde_json::to_string(&original).unwrap();
        let parsed = Request::parse(&json).unwrap();
        assert_eq!(parsed.request_id, original.request_id);
        assert_eq!(parsed.transaction.merchant_id, original.transaction.merchant_id);
        assert!((parsed.transaction.amount - original.transaction.amount).abs() < f64::EPSILON);
    }

    #[test]
    fn non_json_is_invalid_document() {
        let err = Request::parse("not json at all").unwrap_err();
        assert!(matches!(err, DecisionError::InvalidDocument { .. }));
    }

    #[test]
    fn missing_customer_id_is_invalid_request() {
        let mut req = sample_request();
        req.customer.id.clear();
        let json = serde_json::to_string(&req).unwrap();
        let err = Request::parse(&json).unwrap_err();
        match err {
            DecisionError::InvalidRequest { reason } => {
                assert!(reason.contains("customer.id"), "reason: {reason}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn amount_bounds_enforced() {
        let mut req = sample_request();
        req.transaction.amount = 0.0;
        assert!(req.validate().is_err());

        req.transaction.amount = 1_000_000.01;
        assert!(req.validate().is_err());

        req.transaction.amount = 0.01;
        assert!(req.validate().is_ok());

        req.transaction.amount = 1_000_000.0;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn currency_must_be_three_chars() {
        let mut req = sample_request();
        req.transaction.currency = "US".into();
        assert!(req.validate().is_err());
        req.transaction.currency = "USDX".into();
        assert!(req.validate().is_err());
    }

    #[test]
    fn future_timestamp_rejected() {
        let mut req = sample_request();
        req.timestamp = chrono::Utc::now().timestamp_millis() + 2 * 3_600_000;
        assert!(req.validate().is_err());
    }

    #[test]
    fn invalid_ip_rejected_valid_ipv6_accepted() {
        let mut req = sample_request();
        req.device.ip = "999.1.2.3".into();
        assert!(req.validate().is_err());

        req.device.ip = "2001:db8::1".into();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn risk_score_range_enforced() {
        let mut req = sample_request();
        req.customer.risk_score = 100.5;
        assert!(req.validate().is_err());
        req.customer.risk_score = -0.1;
        assert!(req.validate().is_err());
    }

    #[test]
    fn overlong_user_agent_rejected() {
        let mut req = sample_request();
        req.device.user_agent = "x".repeat(501);
        assert!(req.validate().is_err());
    }

    #[test]
    fn cache_key_uses_five_minute_buckets() {
        let mut req = sample_request();
        req.timestamp = 1_700_000_000_000; // fixed epoch ms
        let bucket = 1_700_000_000 / 300;
        assert_eq!(
            req.feature_cache_key(),
            format!("features:cust-7:merchant-42:{bucket}")
        );

        // Same bucket 299 seconds later, next bucket at 300.
        let base = req.feature_cache_key();
        req.timestamp += 299_000;
        assert_eq!(req.feature_cache_key(), base);
        req.timestamp += 1_000;
        assert_ne!(req.feature_cache_key(), base);
    }

    #[test]
    fn private_ip_detection() {
        let mut req = sample_request();
        assert!(!req.has_private_source_ip());
        req.device.ip = "192.168.1.10".into();
        assert!(req.has_private_source_ip());
        req.device.ip = "10.0.0.1".into();
        assert!(req.has_private_source_ip());
        req.device.ip = "127.0.0.1".into();
        assert!(req.has_private_source_ip());
    }
}
