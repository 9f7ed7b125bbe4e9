//! The report value object

use crate::codec::{decode_archival, to_archival};
use crate::error::DecodeError;
use crate::hash::ContentHash;
use chrono::{DateTime, Utc};

/// MIME type of every report the analysis service renders
pub const PDF_MIME: &str = "application/pdf";

/// A rendered diagnosis report plus its capture time
///
/// # Invariants
/// - `hash` is always `ContentHash::compute(&bytes)`
/// - Immutable after construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifact {
    bytes: Vec<u8>,
    mime: String,
    captured_at: DateTime<Utc>,
    hash: ContentHash,
}

impl ReportArtifact {
    /// Wrap a raw response body
    #[must_use]
    pub fn from_transport(
        bytes: impl Into<Vec<u8>>,
        mime: impl Into<String>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        let bytes = bytes.into();
        let hash = ContentHash::compute(&bytes);
        Self {
            bytes,
            mime: mime.into(),
            captured_at,
            hash,
        }
    }

    /// Decode an archival payload
    ///
    /// # Errors
    /// Propagates [`DecodeError`] from the codec
    pub fn from_archival(
        payload: &str,
        mime: impl Into<String>,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, DecodeError> {
        let bytes = decode_archival(payload)?;
        Ok(Self::from_transport(bytes, mime, captured_at))
    }

    /// Archival form of this report
    #[inline]
    #[must_use]
    pub fn to_archival(&self) -> String {
        to_archival(&self.bytes)
    }

    /// Document bytes
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume into the document bytes
    #[inline]
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// MIME type
    #[inline]
    #[must_use]
    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// When the client captured (or the server dated) this report
    #[inline]
    #[must_use]
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Content hash
    #[inline]
    #[must_use]
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    /// Size in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for a zero-length body
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Same document, regardless of capture time or MIME label
    #[inline]
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}
