//! Remote service boundary
//!
//! Stages talk to the clinic backend only through [`DiagnosticBackend`], so
//! the workflow can run against [`HttpBackend`] in production and a scripted
//! fake in tests.

mod http;

pub use http::HttpBackend;

use crate::error::TransportError;
use crate::types::{ImageFile, ImageLocator};
use async_trait::async_trait;
use medilab_session::Credential;

/// Authenticated calls the workflow makes
///
/// Every call carries the credential as the raw `Authorization` value.
#[async_trait]
pub trait DiagnosticBackend: Send + Sync + 'static {
    /// Store an image and return its locator (`{ "image_url": ... }`)
    async fn upload_image(
        &self,
        image: &ImageFile,
        credential: &Credential,
    ) -> Result<ImageLocator, TransportError>;

    /// Analyse a stored image; the body is the report in transport form
    async fn request_diagnosis(
        &self,
        locator: &ImageLocator,
        credential: &Credential,
    ) -> Result<Vec<u8>, TransportError>;

    /// Raw JSON history body for the credential's identity
    async fn fetch_history(
        &self,
        credential: &Credential,
    ) -> Result<serde_json::Value, TransportError>;
}
