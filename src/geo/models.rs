//! Geolocation result types

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

pub const PRIVATE_IP_MESSAGE: &str = "private or local ip";

/// Outcome of a successful lookup
#[derive(Debug, Clone, PartialEq)]
pub enum GeoInfo {
    /// Provider payload, passed through untouched
    Located(Arc<Value>),
    /// Private or loopback address; no provider call was made
    PrivateSkip { ip: String },
}

impl GeoInfo {
    /// The `region` field of the provider payload, when it is a string
    pub fn region(&self) -> Option<&str> {
        match self {
            GeoInfo::Located(payload) => payload.get("region").and_then(Value::as_str),
            GeoInfo::PrivateSkip { .. } => None,
        }
    }

    /// JSON shape returned to clients under `geo_info`
    pub fn to_json(&self) -> Value {
        match self {
            GeoInfo::Located(payload) => payload.as_ref().clone(),
            GeoInfo::PrivateSkip { ip } => error_payload(PRIVATE_IP_MESSAGE, ip),
        }
    }
}

/// `{error, ip}` payload used for skipped and failed lookups
pub fn error_payload(message: &str, ip: &str) -> Value {
    json!({ "error": message, "ip": ip })
}

/// A cached provider response
#[derive(Debug, Clone)]
pub struct GeoRecord {
    pub payload: Arc<Value>,
    pub expires_at: DateTime<Utc>,
}

impl GeoRecord {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("geolocation provider returned HTTP {status}")]
    Status { status: u16 },
    #[error("geolocation request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("geolocation response was not valid JSON: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("invalid geolocation request URL: {0}")]
    Url(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_from_payload() {
        let info = GeoInfo::Located(Arc::new(json!({"ip": "8.8.8.8", "region": "California"})));
        assert_eq!(info.region(), Some("California"));

        let info = GeoInfo::Located(Arc::new(json!({"ip": "8.8.8.8", "country": "US"})));
        assert_eq!(info.region(), None);
    }

    #[test]
    fn test_private_skip_payload() {
        let info = GeoInfo::PrivateSkip {
            ip: "10.0.0.1".to_string(),
        };
        assert_eq!(info.region(), None);
        assert_eq!(
            info.to_json(),
            json!({"error": "private or local ip", "ip": "10.0.0.1"})
        );
    }
}
