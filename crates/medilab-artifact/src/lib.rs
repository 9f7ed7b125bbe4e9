//! Medilab Artifact Codec
//!
//! A diagnosis report reaches the client in two shapes:
//!
//! - **Transport form**: the raw body of the diagnosis response.
//! - **Archival form**: a base64 string inside a history record, sometimes
//!   carrying a `data:<mime>;base64,` prefix.
//!
//! Both decode into the same [`ReportArtifact`], identified by its
//! [`ContentHash`].
//!
//! # Core Concepts
//!
//! - [`decode_archival`] / [`to_archival`]: the base64 codec
//! - [`ObjectUrlRegistry`]: host table of live object URLs
//! - [`DownloadHandle`]: scoped object URL that always releases itself
//! - [`SaveTarget`]: where a triggered download lands
//!
//! # Example
//!
//! ```rust,ignore
//! use medilab_artifact::{wrap_for_download, DirectoryTarget, ObjectUrlRegistry, ReportArtifact};
//!
//! let artifact = ReportArtifact::from_archival(&record.pdf_data, "application/pdf", captured_at)?;
//! let registry = ObjectUrlRegistry::new();
//! let handle = wrap_for_download(&registry, artifact.bytes().to_vec(), artifact.mime());
//! let saved = handle.trigger(&DirectoryTarget::new("./downloads"))?;
//! assert_eq!(registry.outstanding(), 0);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod codec;
mod download;
mod error;
mod hash;
mod object_url;
mod report;

pub use codec::{decode_archival, strip_data_uri_prefix, to_archival, to_data_uri};
pub use download::{
    wrap_for_download, DirectoryTarget, DownloadHandle, SaveRequest, SaveTarget, SavedFile,
    DEFAULT_FILENAME,
};
pub use error::{DecodeError, DownloadError};
pub use hash::ContentHash;
pub use object_url::{ObjectUrl, ObjectUrlRegistry};
pub use report::{ReportArtifact, PDF_MIME};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
