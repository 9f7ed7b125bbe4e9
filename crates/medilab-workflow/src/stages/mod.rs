//! Network stages of a workflow run
//!
//! Each stage consults the [`SessionGate`](medilab_session::SessionGate)
//! before touching the backend and returns `WorkflowError::AuthNotUsable`
//! without side effects when the credential cannot be used.

mod diagnosis;
mod upload;

pub use diagnosis::DiagnosisStage;
pub use upload::UploadStage;
