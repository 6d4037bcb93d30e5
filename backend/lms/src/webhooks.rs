//! Provider webhook payloads: signature check and decoding into a
//! provider-neutral [`Notice`].

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use crate::models::MobileProvider;

/// Header carrying the hex HMAC-SHA256 of the raw callback body.
pub const SIGNATURE_HEADER: &str = "X-Callback-Signature";

/// Status change announced by a provider callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed { reason: String },
    Processing,
    /// A status the platform does not act on.
    Unrecognised(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub transaction_id: Option<String>,
    /// Our payment id, echoed back by the provider.
    pub reference: Option<String>,
    pub outcome: Outcome,
}

/// Field names used by each provider: `(transaction id, reference)`.
fn field_names(provider: MobileProvider) -> (&'static str, &'static str) {
    match provider {
        MobileProvider::Mvola => (
            "serverCorrelationId",
            "requestingOrganisationTransactionReference",
        ),
        MobileProvider::OrangeMoney => ("transactionId", "orderId"),
        MobileProvider::AirtelMoney => ("transaction_id", "reference"),
    }
}

/// Decode a callback body. Unparseable bodies decode as an empty object.
pub fn decode(provider: MobileProvider, body: &[u8]) -> Notice {
    let value: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
    let (tx_key, ref_key) = field_names(provider);

    let status = extract_field(&value, &["status"])
        .unwrap_or_default()
        .to_lowercase();
    let outcome = match status.as_str() {
        "completed" | "success" | "successful" => Outcome::Completed,
        "failed" | "cancelled" | "rejected" => Outcome::Failed {
            reason: extract_field(&value, &["message", "reason"])
                .unwrap_or_else(|| "Payment failed".to_string()),
        },
        "pending" | "processing" => Outcome::Processing,
        _ => Outcome::Unrecognised(status),
    };

    Notice {
        transaction_id: extract_field(&value, &[tx_key]),
        reference: extract_field(&value, &[ref_key]),
        outcome,
    }
}

/// Constant-time check of a hex HMAC-SHA256 signature over `body`.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Hex HMAC-SHA256 of `body`, as a provider would sign it.
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn extract_field(value: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(v) = value.get(key) {
            let s = match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            };
            if s.is_some() {
                return s;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_mvola_success() {
        let body = br#"{"serverCorrelationId":"abc-1","requestingOrganisationTransactionReference":"PAY-1","status":"SUCCESS"}"#;
        let notice = decode(MobileProvider::Mvola, body);
        assert_eq!(notice.transaction_id.as_deref(), Some("abc-1"));
        assert_eq!(notice.reference.as_deref(), Some("PAY-1"));
        assert_eq!(notice.outcome, Outcome::Completed);
    }

    #[test]
    fn decode_orange_failure_reason_fallbacks() {
        let body = br#"{"transactionId":"OM1","orderId":"PAY-2","status":"cancelled","reason":"timeout"}"#;
        let notice = decode(MobileProvider::OrangeMoney, body);
        assert_eq!(
            notice.outcome,
            Outcome::Failed {
                reason: "timeout".to_string()
            }
        );

        let bare = decode(
            MobileProvider::OrangeMoney,
            br#"{"orderId":"PAY-2","status":"failed"}"#,
        );
        assert_eq!(
            bare.outcome,
            Outcome::Failed {
                reason: "Payment failed".to_string()
            }
        );
    }

    #[test]
    fn decode_airtel_numeric_ids_and_pending() {
        let body = br#"{"transaction_id":12345,"reference":"PAY-3","status":"Pending"}"#;
        let notice = decode(MobileProvider::AirtelMoney, body);
        assert_eq!(notice.transaction_id.as_deref(), Some("12345"));
        assert_eq!(notice.outcome, Outcome::Processing);
    }

    #[test]
    fn garbage_body_decodes_as_empty() {
        let notice = decode(MobileProvider::Mvola, b"not json");
        assert_eq!(notice.reference, None);
        assert_eq!(notice.outcome, Outcome::Unrecognised(String::new()));
    }

    #[test]
    fn signature_round_trip() {
        let body = br#"{"status":"success"}"#;
        let signature = sign("s3cret", body);
        assert!(verify_signature("s3cret", body, &signature));
        assert!(!verify_signature("other", body, &signature));
        assert!(!verify_signature("s3cret", b"tampered", &signature));
        assert!(!verify_signature("s3cret", body, "zz"));
        assert!(!verify_signature("", body, &signature));
    }
}
