//! Archival (base64) encoding of report bytes
//!
//! Decoding follows the browser's forgiving base64: ASCII whitespace is
//! ignored, padding is optional and non-zero trailing bits are accepted.
//! Encoding always emits padded standard base64.

use crate::error::DecodeError;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::{alphabet, Engine};

const FORGIVING: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Drop everything up to and including the first comma
///
/// `data:application/pdf;base64,JVBERi0=` becomes `JVBERi0=`; a payload
/// without a comma is returned unchanged.
#[inline]
#[must_use]
pub fn strip_data_uri_prefix(payload: &str) -> &str {
    payload.split_once(',').map_or(payload, |(_, rest)| rest)
}

/// Archival form to bytes
///
/// # Errors
/// `DecodeError::InvalidBase64` if what remains after the prefix is not base64
pub fn decode_archival(payload: &str) -> Result<Vec<u8>, DecodeError> {
    let body = strip_data_uri_prefix(payload);

    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    FORGIVING
        .decode(compact.as_bytes())
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))
}

/// Bytes to archival form (no prefix)
#[inline]
#[must_use]
pub fn to_archival(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Bytes to a `data:` URI, the prefixed archival variant
#[inline]
#[must_use]
pub fn to_data_uri(bytes: &[u8], mime: &str) -> String {
    format!("data:{mime};base64,{}", to_archival(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_prefix_up_to_first_comma() {
        assert_eq!(strip_data_uri_prefix("data:application/pdf;base64,QUJD"), "QUJD");
        assert_eq!(strip_data_uri_prefix("QUJD"), "QUJD");
        assert_eq!(strip_data_uri_prefix(","), "");
    }

    #[test]
    fn decodes_with_and_without_prefix() {
        assert_eq!(decode_archival("QUJD").unwrap(), b"ABC");
        assert_eq!(decode_archival("data:application/pdf;base64,QUJD").unwrap(), b"ABC");
    }

    #[test]
    fn padding_is_optional() {
        assert_eq!(decode_archival("QQ==").unwrap(), b"A");
        assert_eq!(decode_archival("QQ").unwrap(), b"A");
    }

    #[test]
    fn whitespace_is_ignored() {
        assert_eq!(decode_archival("QU\nJD\r\n").unwrap(), b"ABC");
    }

    #[test]
    fn empty_payload_decodes_to_empty() {
        assert_eq!(decode_archival("").unwrap(), Vec::<u8>::new());
        assert_eq!(decode_archival("data:application/pdf;base64,").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn corrupt_payload_is_an_error_not_a_panic() {
        assert!(matches!(
            decode_archival("%%%not-base64%%%"),
            Err(DecodeError::InvalidBase64(_))
        ));
        assert!(decode_archival("QUJDR").is_err());
    }

    #[test]
    fn second_comma_is_not_stripped() {
        assert!(decode_archival("data:x,QUJD,QUJD").is_err());
    }

    #[test]
    fn data_uri_roundtrip() {
        let uri = to_data_uri(b"%PDF", "application/pdf");
        assert!(uri.starts_with("data:application/pdf;base64,"));
        assert_eq!(decode_archival(&uri).unwrap(), b"%PDF");
    }
}
