//! Host object-URL table
//!
//! Mirrors the browser's `createObjectURL` / `revokeObjectURL` pair: a
//! registered blob stays alive until its URL is revoked. The registry is
//! cheap to clone; clones share the same table.

use dashmap::DashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

/// URL referring to a registered blob
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    fn generate() -> Self {
        Self(format!("blob:medilab/{}", Uuid::new_v4()))
    }

    /// URL text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ObjectUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
struct Blob {
    bytes: Arc<[u8]>,
    mime: String,
}

/// Registry of live object URLs
#[derive(Debug, Clone, Default)]
pub struct ObjectUrlRegistry {
    entries: Arc<DashMap<ObjectUrl, Blob>>,
}

impl ObjectUrlRegistry {
    /// Empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a blob and hand back its URL
    pub fn create(&self, bytes: impl Into<Arc<[u8]>>, mime: impl Into<String>) -> ObjectUrl {
        let url = ObjectUrl::generate();
        self.entries.insert(
            url.clone(),
            Blob {
                bytes: bytes.into(),
                mime: mime.into(),
            },
        );
        tracing::trace!(url = %url, "object URL created");
        url
    }

    /// Blob behind a live URL
    #[must_use]
    pub fn resolve(&self, url: &ObjectUrl) -> Option<(Arc<[u8]>, String)> {
        self.entries
            .get(url)
            .map(|blob| (Arc::clone(&blob.bytes), blob.mime.clone()))
    }

    /// Release one URL; `false` if it was not live
    pub fn revoke(&self, url: &ObjectUrl) -> bool {
        let removed = self.entries.remove(url).is_some();
        if removed {
            tracing::trace!(url = %url, "object URL revoked");
        }
        removed
    }

    /// Release every live URL, returning how many were released
    pub fn revoke_all(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        if count > 0 {
            tracing::debug!(count, "revoked outstanding object URLs");
        }
        count
    }

    /// Number of live URLs
    #[inline]
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.entries.len()
    }

    /// Whether `url` is still live
    #[inline]
    #[must_use]
    pub fn is_live(&self, url: &ObjectUrl) -> bool {
        self.entries.contains_key(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_resolve_revoke() {
        let registry = ObjectUrlRegistry::new();
        let url = registry.create(b"pdf".to_vec(), "application/pdf");

        assert!(url.as_str().starts_with("blob:medilab/"));
        assert_eq!(registry.outstanding(), 1);

        let (bytes, mime) = registry.resolve(&url).unwrap();
        assert_eq!(&*bytes, b"pdf");
        assert_eq!(mime, "application/pdf");

        assert!(registry.revoke(&url));
        assert!(!registry.revoke(&url));
        assert!(registry.resolve(&url).is_none());
        assert_eq!(registry.outstanding(), 0);
    }

    #[test]
    fn clones_share_the_table() {
        let registry = ObjectUrlRegistry::new();
        let other = registry.clone();
        let _ = registry.create(vec![1u8, 2, 3], "application/pdf");
        let _ = registry.create(vec![4u8], "application/pdf");
        assert_eq!(other.outstanding(), 2);
        assert_eq!(other.revoke_all(), 2);
        assert_eq!(registry.outstanding(), 0);
    }

    #[test]
    fn urls_are_unique() {
        let registry = ObjectUrlRegistry::new();
        let a = registry.create(Vec::<u8>::new(), "a");
        let b = registry.create(Vec::<u8>::new(), "a");
        assert_ne!(a, b);
    }
}
