//! Temporary object-store credentials issued per tenant.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::error::StorageError;

/// Wrapper key some backend responses nest the credential fields under.
const CREDENTIAL_WRAPPER_KEY: &str = "amazonTemporaryCredentials";

/// Temporary credentials with an absolute expiration.
#[derive(Debug, Clone)]
pub struct TemporaryCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    /// Absolute expiration in epoch seconds (UTC).
    pub expiration: i64,
}

impl TemporaryCredentials {
    /// Parse a credential document returned by the backend.
    ///
    /// Accepts both the nested form (fields under
    /// `amazonTemporaryCredentials`) and the flat form, and an expiration
    /// encoded as either a decimal string or an integer.
    pub fn from_json(value: &Value) -> Result<Self, StorageError> {
        let body: &Value = value.get(CREDENTIAL_WRAPPER_KEY).unwrap_or(value);

        let access_key_id = required_string(body, "accessKeyId")?;
        let secret_access_key = required_string(body, "secretAccessKey")?;
        let session_token: Option<String> = body
            .get("sessionToken")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        let expiration_field = body.get("expirationTimestampSecondsInUTC").ok_or_else(|| {
            StorageError::InvalidCredential {
                message: "missing expirationTimestampSecondsInUTC".to_string(),
            }
        })?;
        let expiration: i64 = match expiration_field {
            Value::String(text) => text.parse().map_err(|_| StorageError::InvalidCredential {
                message: format!("unparseable expiration: {}", text),
            })?,
            Value::Number(number) => {
                number
                    .as_i64()
                    .ok_or_else(|| StorageError::InvalidCredential {
                        message: format!("unparseable expiration: {}", number),
                    })?
            }
            other => {
                return Err(StorageError::InvalidCredential {
                    message: format!("unexpected expiration type: {}", other),
                })
            }
        };

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
            expiration,
        })
    }

    /// Whether these credentials must be refreshed: the serve condition is
    /// `now + refresh_margin < expiration`, strictly.
    pub fn needs_refresh(&self, refresh_margin_seconds: i64, now_epoch_seconds: i64) -> bool {
        now_epoch_seconds + refresh_margin_seconds >= self.expiration
    }
}

fn required_string(body: &Value, field: &str) -> Result<String, StorageError> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StorageError::InvalidCredential {
            message: format!("missing {}", field),
        })
}

/// Current wall clock as epoch seconds.
pub(crate) fn current_epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_nested() {
        let value = json!({
            "amazonTemporaryCredentials": {
                "accessKeyId": "AKIA",
                "secretAccessKey": "secret",
                "sessionToken": "token",
                "expirationTimestampSecondsInUTC": "1700000000"
            }
        });
        let credentials = TemporaryCredentials::from_json(&value).unwrap();
        assert_eq!(credentials.access_key_id, "AKIA");
        assert_eq!(credentials.secret_access_key, "secret");
        assert_eq!(credentials.session_token.as_deref(), Some("token"));
        assert_eq!(credentials.expiration, 1700000000);
    }

    #[test]
    fn test_from_json_flat_numeric_expiration() {
        let value = json!({
            "accessKeyId": "AKIA",
            "secretAccessKey": "secret",
            "expirationTimestampSecondsInUTC": 1700000000
        });
        let credentials = TemporaryCredentials::from_json(&value).unwrap();
        assert_eq!(credentials.expiration, 1700000000);
        assert!(credentials.session_token.is_none());
    }

    #[test]
    fn test_from_json_empty_session_token() {
        let value = json!({
            "accessKeyId": "AKIA",
            "secretAccessKey": "secret",
            "sessionToken": "",
            "expirationTimestampSecondsInUTC": "1700000000"
        });
        let credentials = TemporaryCredentials::from_json(&value).unwrap();
        assert!(credentials.session_token.is_none());
    }

    #[test]
    fn test_from_json_missing_field() {
        let value = json!({"accessKeyId": "AKIA"});
        let err = TemporaryCredentials::from_json(&value).unwrap_err();
        assert!(matches!(err, StorageError::InvalidCredential { .. }));
    }

    #[test]
    fn test_from_json_bad_expiration() {
        let value = json!({
            "accessKeyId": "AKIA",
            "secretAccessKey": "secret",
            "expirationTimestampSecondsInUTC": "soon"
        });
        let err = TemporaryCredentials::from_json(&value).unwrap_err();
        assert!(matches!(err, StorageError::InvalidCredential { .. }));
    }

    fn credentials_expiring_at(expiration: i64) -> TemporaryCredentials {
        TemporaryCredentials {
            access_key_id: "AKIA".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: None,
            expiration,
        }
    }

    #[test]
    fn test_needs_refresh_expired_now() {
        let now: i64 = 1_000_000;
        assert!(credentials_expiring_at(now).needs_refresh(600, now));
    }

    #[test]
    fn test_needs_refresh_inside_margin() {
        let now: i64 = 1_000_000;
        assert!(credentials_expiring_at(now + 599).needs_refresh(600, now));
    }

    #[test]
    fn test_needs_refresh_exactly_at_margin() {
        let now: i64 = 1_000_000;
        assert!(credentials_expiring_at(now + 600).needs_refresh(600, now));
    }

    #[test]
    fn test_needs_refresh_outside_margin() {
        let now: i64 = 1_000_000;
        assert!(!credentials_expiring_at(now + 601).needs_refresh(600, now));
    }
}
