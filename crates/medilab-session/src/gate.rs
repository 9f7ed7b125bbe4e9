//! Usability predicate consulted before every authenticated call

use crate::credential::{Credential, DecodedCredential};
use crate::error::SessionError;
use chrono::{DateTime, Utc};

/// Local credential gate
///
/// Pure: never performs I/O, never fails loudly. Every stage asks
/// [`SessionGate::is_usable`] before issuing a request and silently does
/// nothing when the answer is `false`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionGate {
    /// Clock skew tolerated past `exp`, in seconds
    leeway_secs: i64,
}

impl SessionGate {
    /// Gate with no clock-skew leeway
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With clock-skew leeway
    #[inline]
    #[must_use]
    pub fn with_leeway_secs(mut self, secs: i64) -> Self {
        self.leeway_secs = secs.max(0);
        self
    }

    /// Decode a credential and evaluate expiry at the current time
    ///
    /// # Errors
    /// Structural decoding failures
    pub fn decode(&self, credential: &Credential) -> Result<DecodedCredential, SessionError> {
        self.decode_at(credential, Utc::now())
    }

    /// Decode a credential and evaluate expiry at `now`
    ///
    /// # Errors
    /// Structural decoding failures
    pub fn decode_at(
        &self,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> Result<DecodedCredential, SessionError> {
        let claims = credential.decode_claims()?;
        let is_expired = claims.is_expired_at(now, self.leeway_secs);
        Ok(DecodedCredential { claims, is_expired })
    }

    /// Non-empty, decodable and not expired
    #[must_use]
    pub fn is_usable(&self, credential: &Credential) -> bool {
        self.is_usable_at(credential, Utc::now())
    }

    /// [`is_usable`](Self::is_usable) evaluated at a fixed instant
    #[must_use]
    pub fn is_usable_at(&self, credential: &Credential, now: DateTime<Utc>) -> bool {
        if credential.is_empty() {
            return false;
        }
        match self.decode_at(credential, now) {
            Ok(decoded) => !decoded.is_expired,
            Err(e) => {
                tracing::debug!(error = %e, "credential not decodable");
                false
            }
        }
    }

    /// Subject of a usable credential
    #[must_use]
    pub fn subject(&self, credential: &Credential) -> Option<String> {
        self.decode(credential)
            .ok()
            .filter(|d| !d.is_expired)
            .and_then(|d| d.claims.subject)
    }
}
