//! Core value types flowing between stages

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::path::Path;

/// A user-selected image, held in memory until uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    name: String,
    bytes: Vec<u8>,
    mime: String,
}

impl ImageFile {
    /// Create from a file name and contents; MIME type is guessed from the extension
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let mime = guess_mime(&name).to_string();
        Self {
            name,
            bytes: bytes.into(),
            mime,
        }
    }

    /// Override the MIME type
    #[inline]
    #[must_use]
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }

    /// Read an image from disk
    ///
    /// # Errors
    /// Any I/O error from reading the file
    pub async fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self::new(name, bytes))
    }

    /// File name sent in the multipart part
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw contents
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// MIME type
    #[inline]
    #[must_use]
    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Size in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for an empty file
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn guess_mime(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        "dcm" => "application/dicom",
        _ => "application/octet-stream",
    }
}

/// URL of an uploaded image on the remote store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageLocator(String);

impl ImageLocator {
    /// Wrap a URL string
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// URL text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ImageLocator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one workflow run; bumps on every new image and on reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct RunId(u64);

impl RunId {
    /// Following run
    #[inline]
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Numeric value
    #[inline]
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_guess_from_extension() {
        assert_eq!(ImageFile::new("scan1.png", vec![1u8]).mime(), "image/png");
        assert_eq!(ImageFile::new("CHEST.JPEG", vec![1u8]).mime(), "image/jpeg");
        assert_eq!(
            ImageFile::new("noext", vec![1u8]).mime(),
            "application/octet-stream"
        );
        assert_eq!(
            ImageFile::new("x.png", vec![1u8]).with_mime("image/x-custom").mime(),
            "image/x-custom"
        );
    }

    #[tokio::test]
    async fn load_reads_name_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan1.png");
        std::fs::write(&path, b"\x89PNG").unwrap();

        let image = ImageFile::load(&path).await.unwrap();
        assert_eq!(image.name(), "scan1.png");
        assert_eq!(image.bytes(), b"\x89PNG");
        assert_eq!(image.len(), 4);
    }

    #[test]
    fn run_ids_advance() {
        let first = RunId::default();
        assert_eq!(first.next().get(), 1);
        assert_eq!(first.next().to_string(), "run-1");
    }

    #[test]
    fn locator_is_transparent_in_json() {
        let locator = ImageLocator::new("https://store/x1");
        assert_eq!(
            serde_json::to_string(&locator).unwrap(),
            "\"https://store/x1\""
        );
    }
}
