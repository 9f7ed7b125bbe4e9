//! Scoped download of a report
//!
//! [`wrap_for_download`] registers the bytes as an object URL and returns a
//! [`DownloadHandle`] that owns it. The URL is revoked when the handle is
//! dropped, so triggering (success or failure) and abandoning the handle
//! all release it synchronously.

use crate::error::DownloadError;
use crate::hash::ContentHash;
use crate::object_url::{ObjectUrl, ObjectUrlRegistry};
use std::path::{Path, PathBuf};

/// File name every report is saved under
pub const DEFAULT_FILENAME: &str = "diagnosis.pdf";

/// What the host is asked to save
#[derive(Debug)]
pub struct SaveRequest<'a> {
    /// Suggested file name
    pub filename: &'a str,
    /// MIME type of the blob
    pub mime: &'a str,
    /// Blob contents
    pub bytes: &'a [u8],
    /// Object URL the anchor points at
    pub url: &'a ObjectUrl,
}

/// Host side of a download: the native "save file" interaction
pub trait SaveTarget: Send + Sync {
    /// Persist the blob, returning where it landed
    ///
    /// # Errors
    /// Any I/O failure in the host
    fn save(&self, request: &SaveRequest<'_>) -> std::io::Result<PathBuf>;
}

/// Saves into a fixed directory
#[derive(Debug, Clone)]
pub struct DirectoryTarget {
    dir: PathBuf,
}

impl DirectoryTarget {
    /// Target directory (created on first save)
    #[inline]
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SaveTarget for DirectoryTarget {
    fn save(&self, request: &SaveRequest<'_>) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(request.filename);
        std::fs::write(&path, request.bytes)?;
        Ok(path)
    }
}

/// Outcome of a successful download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    /// File name used
    pub filename: String,
    /// Where the host put it
    pub location: PathBuf,
    /// MIME type
    pub mime: String,
    /// Bytes written
    pub len: usize,
    /// Hash of what was written
    pub hash: ContentHash,
}

/// Exclusive owner of one object URL
#[derive(Debug)]
pub struct DownloadHandle {
    registry: ObjectUrlRegistry,
    url: ObjectUrl,
    filename: String,
}

/// Register `bytes` and wrap the URL in a handle
#[must_use]
pub fn wrap_for_download(
    registry: &ObjectUrlRegistry,
    bytes: impl Into<Vec<u8>>,
    mime: &str,
) -> DownloadHandle {
    let url = registry.create(bytes.into(), mime);
    DownloadHandle {
        registry: registry.clone(),
        url,
        filename: DEFAULT_FILENAME.to_string(),
    }
}

impl DownloadHandle {
    /// Override the saved file name
    #[inline]
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Object URL owned by this handle
    #[inline]
    #[must_use]
    pub fn url(&self) -> &ObjectUrl {
        &self.url
    }

    /// File name the download will use
    #[inline]
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Click the synthetic anchor
    ///
    /// Consumes the handle; the object URL is revoked before this returns,
    /// whatever the outcome.
    ///
    /// # Errors
    /// - `DownloadError::Revoked` if the URL was released out from under us
    /// - `DownloadError::SaveFailed` if the host could not save
    pub fn trigger(self, target: &dyn SaveTarget) -> Result<SavedFile, DownloadError> {
        let Some((bytes, mime)) = self.registry.resolve(&self.url) else {
            return Err(DownloadError::Revoked(self.url.to_string()));
        };

        let request = SaveRequest {
            filename: &self.filename,
            mime: &mime,
            bytes: &bytes,
            url: &self.url,
        };

        match target.save(&request) {
            Ok(location) => {
                tracing::info!(file = %self.filename, len = bytes.len(), "report saved");
                Ok(SavedFile {
                    filename: self.filename.clone(),
                    location,
                    mime: mime.clone(),
                    len: bytes.len(),
                    hash: ContentHash::compute(&bytes),
                })
            }
            Err(source) => {
                tracing::warn!(file = %self.filename, error = %source, "report save failed");
                Err(DownloadError::SaveFailed {
                    filename: self.filename.clone(),
                    source,
                })
            }
        }
    }
}

impl Drop for DownloadHandle {
    fn drop(&mut self) {
        self.registry.revoke(&self.url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct Refusing;

    impl SaveTarget for Refusing {
        fn save(&self, _request: &SaveRequest<'_>) -> io::Result<PathBuf> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "blocked"))
        }
    }

    #[test]
    fn trigger_saves_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ObjectUrlRegistry::new();
        let handle = wrap_for_download(&registry, b"%PDF-1.4".to_vec(), "application/pdf");
        assert_eq!(registry.outstanding(), 1);

        let saved = handle.trigger(&DirectoryTarget::new(dir.path())).unwrap();

        assert_eq!(saved.filename, "diagnosis.pdf");
        assert_eq!(saved.location, dir.path().join("diagnosis.pdf"));
        assert_eq!(std::fs::read(&saved.location).unwrap(), b"%PDF-1.4");
        assert_eq!(registry.outstanding(), 0);
    }

    #[test]
    fn failed_save_still_releases() {
        let registry = ObjectUrlRegistry::new();
        let handle = wrap_for_download(&registry, vec![1u8, 2, 3], "application/pdf");

        let err = handle.trigger(&Refusing).unwrap_err();

        assert!(matches!(err, DownloadError::SaveFailed { .. }));
        assert_eq!(registry.outstanding(), 0);
    }

    #[test]
    fn dropped_handle_releases() {
        let registry = ObjectUrlRegistry::new();
        {
            let _handle = wrap_for_download(&registry, vec![0u8], "application/pdf");
            assert_eq!(registry.outstanding(), 1);
        }
        assert_eq!(registry.outstanding(), 0);
    }

    #[test]
    fn revoked_handle_cannot_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ObjectUrlRegistry::new();
        let handle = wrap_for_download(&registry, vec![0u8], "application/pdf");
        registry.revoke_all();

        let err = handle.trigger(&DirectoryTarget::new(dir.path())).unwrap_err();
        assert!(matches!(err, DownloadError::Revoked(_)));
        assert!(!dir.path().join("diagnosis.pdf").exists());
    }

    #[test]
    fn custom_filename() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ObjectUrlRegistry::new();
        let handle = wrap_for_download(&registry, vec![9u8], "application/pdf")
            .with_filename("scan-1.pdf");
        assert_eq!(handle.filename(), "scan-1.pdf");
        let saved = handle.trigger(&DirectoryTarget::new(dir.path())).unwrap();
        assert!(saved.location.ends_with("scan-1.pdf"));
    }
}
