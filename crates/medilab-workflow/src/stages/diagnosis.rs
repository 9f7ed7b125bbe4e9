use crate::backend::DiagnosticBackend;
use crate::error::WorkflowError;
use crate::types::ImageLocator;
use chrono::Utc;
use medilab_artifact::ReportArtifact;
use medilab_session::{Credential, SessionGate};
use std::sync::Arc;

/// Asks the analysis service for a report on an uploaded image
#[derive(Debug)]
pub struct DiagnosisStage<B> {
    backend: Arc<B>,
    gate: SessionGate,
    mime: String,
}

impl<B: DiagnosticBackend> DiagnosisStage<B> {
    /// Create stage over a shared backend; reports are labelled `mime`
    #[inline]
    #[must_use]
    pub fn new(backend: Arc<B>, gate: SessionGate, mime: impl Into<String>) -> Self {
        Self {
            backend,
            gate,
            mime: mime.into(),
        }
    }

    /// Request a report; the capture time is stamped on arrival
    ///
    /// # Errors
    /// - `WorkflowError::AuthNotUsable` if the gate refuses (no request sent)
    /// - `WorkflowError::DiagnosisFailed` on any transport failure
    pub async fn diagnose(
        &self,
        locator: &ImageLocator,
        credential: &Credential,
    ) -> Result<ReportArtifact, WorkflowError> {
        if !self.gate.is_usable(credential) {
            tracing::debug!("diagnosis skipped: credential not usable");
            return Err(WorkflowError::AuthNotUsable);
        }

        let bytes = self
            .backend
            .request_diagnosis(locator, credential)
            .await
            .map_err(|e| {
                tracing::warn!(image = %locator, error = %e, "diagnosis request failed");
                WorkflowError::DiagnosisFailed(e)
            })?;

        let report = ReportArtifact::from_transport(bytes, self.mime.clone(), Utc::now());
        tracing::info!(image = %locator, len = report.len(), hash = %report.hash().short(), "report received");
        Ok(report)
    }
}
