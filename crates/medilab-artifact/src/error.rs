//! Error types for the artifact codec and downloads

/// Archival payload could not be turned back into bytes
///
/// Always local to one record or artifact; never aborts a batch.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Remainder is not valid base64
    #[error("invalid base64 in archival payload: {0}")]
    InvalidBase64(String),
}

/// Failure while triggering a download
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Object URL was released before the download was triggered
    #[error("object URL {0} was already revoked")]
    Revoked(String),

    /// Host refused or failed to save the file
    #[error("failed to save {filename}: {source}")]
    SaveFailed {
        filename: String,
        #[source]
        source: std::io::Error,
    },
}
