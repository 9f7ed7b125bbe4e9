//! Error types for credential decoding

/// Reasons a credential could not be decoded
///
/// Callers outside this crate never show these to the user: any failure is
/// folded into "not usable" by [`SessionGate::is_usable`](crate::SessionGate::is_usable).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    /// Credential string is empty
    #[error("credential is empty")]
    Empty,

    /// Not three dot-separated segments
    #[error("malformed credential: expected 3 segments, found {found}")]
    Malformed { found: usize },

    /// Payload segment is not valid base64url
    #[error("payload is not valid base64url: {0}")]
    PayloadEncoding(String),

    /// Payload is not a JSON object
    #[error("payload is not a JSON claim set: {0}")]
    PayloadJson(String),

    /// A time claim is present but not a valid timestamp
    #[error("claim `{claim}` is not a valid timestamp")]
    InvalidTimestamp { claim: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_error_display() {
        let err = SessionError::Malformed { found: 2 };
        assert!(err.to_string().contains("3 segments"));
        assert!(err.to_string().contains('2'));
    }
}
