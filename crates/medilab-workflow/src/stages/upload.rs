use crate::backend::DiagnosticBackend;
use crate::error::WorkflowError;
use crate::types::{ImageFile, ImageLocator};
use medilab_session::{Credential, SessionGate};
use std::sync::Arc;

/// Sends the selected image to the image store
#[derive(Debug)]
pub struct UploadStage<B> {
    backend: Arc<B>,
    gate: SessionGate,
}

impl<B: DiagnosticBackend> UploadStage<B> {
    /// Create stage over a shared backend
    #[inline]
    #[must_use]
    pub fn new(backend: Arc<B>, gate: SessionGate) -> Self {
        Self { backend, gate }
    }

    /// Upload `file` and return the locator the store assigned
    ///
    /// # Errors
    /// - `WorkflowError::AuthNotUsable` if the gate refuses (no request sent)
    /// - `WorkflowError::UploadFailed` on any transport failure
    pub async fn upload(
        &self,
        file: &ImageFile,
        credential: &Credential,
    ) -> Result<ImageLocator, WorkflowError> {
        if !self.gate.is_usable(credential) {
            tracing::debug!("upload skipped: credential not usable");
            return Err(WorkflowError::AuthNotUsable);
        }

        match self.backend.upload_image(file, credential).await {
            Ok(locator) => {
                tracing::info!(file = file.name(), image = %locator, "image uploaded");
                Ok(locator)
            }
            Err(e) => {
                tracing::warn!(file = file.name(), error = %e, "image upload failed");
                Err(WorkflowError::UploadFailed(e))
            }
        }
    }
}
