//! Medilab Diagnostic Workflow
//!
//! Drives one patient image through the clinic's diagnosis pipeline:
//! - Uploads the image and keeps the returned locator
//! - Requests an AI diagnosis and captures the report
//! - Runs a fixed-length scanning indicator independent of the request
//! - Lists previously produced reports, tolerating undecodable records
//!
//! All of it is sequenced by a single [`WorkflowController`].
//!
//! # Example
//!
//! ```rust,ignore
//! use medilab_workflow::prelude::*;
//!
//! # async fn example(token: String) -> Result<(), Box<dyn std::error::Error>> {
//! let config = WorkflowConfig::new().apply_env()?;
//! let backend = HttpBackend::new(&config)?;
//! let mut controller = WorkflowController::new(backend, config);
//! let credential = Credential::new(token);
//!
//! controller.select_image(ImageFile::load("scan1.png").await?)?;
//! controller.upload(&credential).await?;
//! controller.begin_scan(&credential)?;
//! controller.wait_for_report().await?;
//! controller.download_report(&DirectoryTarget::new("."))?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod history;
pub mod stages;
pub mod state_machine;
pub mod types;

pub use backend::{DiagnosticBackend, HttpBackend};
pub use config::{WorkflowConfig, ENV_BASE_URL, ENV_SCAN_INDICATOR_MS};
pub use controller::{EventOutcome, WorkflowController, WorkflowSnapshot};
pub use error::{ConfigError, ErrorKind, TransportError, WorkflowError};
pub use history::{
    parse_history, parse_record_date, ArchivedReport, DownloadOutcome, HistoryRecord,
    HistoryStage, HistoryView,
};
pub use stages::{DiagnosisStage, UploadStage};
pub use state_machine::{validate_transition, WorkflowState};
pub use types::{ImageFile, ImageLocator, RunId};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving a workflow
    pub use crate::{
        DiagnosticBackend, DownloadOutcome, HistoryView, HttpBackend, ImageFile, ImageLocator,
        WorkflowConfig, WorkflowController, WorkflowError, WorkflowState,
    };
    pub use medilab_artifact::{DirectoryTarget, ReportArtifact, SaveTarget};
    pub use medilab_session::{Credential, SessionGate};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
