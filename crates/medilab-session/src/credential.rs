//! Bearer credential and its decoded claim set

use crate::error::SessionError;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::{alphabet, Engine};
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Map, Value};
use std::fmt;

/// base64url with optional padding, as issued by JWT libraries
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Opaque bearer credential supplied by the session provider
///
/// Sent verbatim as the `Authorization` header value. `Debug` never prints
/// the token body.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw token string
    #[inline]
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw header value
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the token string is empty or whitespace
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Decode the claim segment without verifying the signature
    ///
    /// # Errors
    /// Any structural problem with the token
    pub fn decode_claims(&self) -> Result<Claims, SessionError> {
        let token = self.0.trim();
        if token.is_empty() {
            return Err(SessionError::Empty);
        }

        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(SessionError::Malformed {
                found: segments.len(),
            });
        }

        let payload = PAYLOAD_ENGINE
            .decode(segments[1])
            .map_err(|e| SessionError::PayloadEncoding(e.to_string()))?;

        let value: Value = serde_json::from_slice(&payload)
            .map_err(|e| SessionError::PayloadJson(e.to_string()))?;

        match value {
            Value::Object(map) => Claims::from_map(map),
            other => Err(SessionError::PayloadJson(format!(
                "expected object, found {}",
                kind_of(&other)
            ))),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<{} bytes>)", self.0.len())
    }
}

impl From<&str> for Credential {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Credential {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Identity claims carried by a credential
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    /// Subject identifier (`sub`, or the backend's `dni` claim)
    pub subject: Option<String>,
    /// `iat`
    pub issued_at: Option<DateTime<Utc>>,
    /// `exp`; absent means the credential never expires
    pub expires_at: Option<DateTime<Utc>>,
    /// Every other claim, untouched
    pub extra: Map<String, Value>,
}

impl Claims {
    fn from_map(mut map: Map<String, Value>) -> Result<Self, SessionError> {
        let issued_at = take_timestamp(&mut map, "iat")?;
        let expires_at = take_timestamp(&mut map, "exp")?;

        let subject = map
            .get("sub")
            .or_else(|| map.get("dni"))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        Ok(Self {
            subject,
            issued_at,
            expires_at,
            extra: map,
        })
    }

    /// Check expiry against `now`, allowing `leeway_secs` of clock skew
    ///
    /// A deadline past the representable range never expires.
    #[inline]
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>, leeway_secs: i64) -> bool {
        self.expires_at.is_some_and(|exp| {
            TimeDelta::try_seconds(leeway_secs)
                .and_then(|leeway| exp.checked_add_signed(leeway))
                .is_some_and(|deadline| deadline <= now)
        })
    }
}

/// Result of a local decode
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCredential {
    /// Claim set
    pub claims: Claims,
    /// Expiry as observed at decode time
    pub is_expired: bool,
}

fn take_timestamp(
    map: &mut Map<String, Value>,
    claim: &'static str,
) -> Result<Option<DateTime<Utc>>, SessionError> {
    let Some(value) = map.remove(claim) else {
        return Ok(None);
    };

    #[allow(clippy::cast_possible_truncation)]
    let secs = match &value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or(SessionError::InvalidTimestamp { claim })?,
        Value::Null => return Ok(None),
        _ => return Err(SessionError::InvalidTimestamp { claim }),
    };

    DateTime::from_timestamp(secs, 0)
        .map(Some)
        .ok_or(SessionError::InvalidTimestamp { claim })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn token_with(payload: &str) -> Credential {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload);
        Credential::new(format!("{header}.{body}.c2ln"))
    }

    #[test]
    fn decodes_backend_dni_claim() {
        let claims = token_with(r#"{"dni":"30111222"}"#).decode_claims().unwrap();
        assert_eq!(claims.subject.as_deref(), Some("30111222"));
        assert!(claims.expires_at.is_none());
        assert!(claims.extra.contains_key("dni"));
    }

    #[test]
    fn numeric_subject_is_stringified() {
        let claims = token_with(r#"{"dni":30111222}"#).decode_claims().unwrap();
        assert_eq!(claims.subject.as_deref(), Some("30111222"));
    }

    #[test]
    fn sub_takes_precedence_over_dni() {
        let claims = token_with(r#"{"sub":"u-1","dni":"2"}"#).decode_claims().unwrap();
        assert_eq!(claims.subject.as_deref(), Some("u-1"));
    }

    #[test]
    fn parses_time_claims() {
        let claims = token_with(r#"{"sub":"a","iat":1700000000,"exp":1700003600}"#)
            .decode_claims()
            .unwrap();
        assert_eq!(claims.issued_at.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(claims.expires_at.unwrap().timestamp(), 1_700_003_600);
    }

    #[test]
    fn rejects_wrong_segment_count() {
        let err = Credential::new("abc.def").decode_claims().unwrap_err();
        assert_eq!(err, SessionError::Malformed { found: 2 });
    }

    #[test]
    fn rejects_non_object_payload() {
        let err = token_with("[1,2]").decode_claims().unwrap_err();
        assert!(matches!(err, SessionError::PayloadJson(_)));
    }

    #[test]
    fn rejects_string_expiry() {
        let err = token_with(r#"{"exp":"tomorrow"}"#).decode_claims().unwrap_err();
        assert_eq!(err, SessionError::InvalidTimestamp { claim: "exp" });
    }

    #[test]
    fn debug_redacts_token() {
        let credential = Credential::new("secret.token.value");
        let printed = format!("{credential:?}");
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn expiry_respects_leeway() {
        let claims = token_with(r#"{"exp":1000}"#).decode_claims().unwrap();
        let now = DateTime::from_timestamp(1005, 0).unwrap();
        assert!(claims.is_expired_at(now, 0));
        assert!(!claims.is_expired_at(now, 10));
    }

    #[test]
    fn expiry_arithmetic_saturates() {
        let now = DateTime::from_timestamp(5000, 0).unwrap();
        let claims = token_with(r#"{"exp":2000}"#).decode_claims().unwrap();
        assert!(!claims.is_expired_at(now, i64::MAX));

        let max = DateTime::<Utc>::MAX_UTC.timestamp();
        let far = token_with(&format!(r#"{{"exp":{max}}}"#)).decode_claims().unwrap();
        assert!(!far.is_expired_at(now, 0));
        assert!(!far.is_expired_at(now, 60));
        assert!(!far.is_expired_at(DateTime::<Utc>::MAX_UTC, 1));
    }
}
