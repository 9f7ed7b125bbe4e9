//! Workflow configuration
//!
//! Defaults match the clinic backend's routes. Values can come from a TOML
//! file and be overridden by `MEDILAB_*` environment variables.

use crate::error::ConfigError;
use medilab_artifact::{DEFAULT_FILENAME, PDF_MIME};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Environment variable overriding `base_url`
pub const ENV_BASE_URL: &str = "MEDILAB_BASE_URL";
/// Environment variable overriding `scan_indicator_ms`
pub const ENV_SCAN_INDICATOR_MS: &str = "MEDILAB_SCAN_INDICATOR_MS";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Backend origin
    pub base_url: String,
    /// Multipart image upload route
    pub upload_path: String,
    /// Analysis route
    pub diagnosis_path: String,
    /// History route
    pub history_path: String,
    /// How long the scanning indicator stays up, independent of the request
    pub scan_indicator_ms: u64,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// MIME type attached to reports
    pub report_mime: String,
    /// File name used when saving reports
    pub download_filename: String,
}

impl WorkflowConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With backend origin
    #[inline]
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// With scanning indicator duration
    #[inline]
    #[must_use]
    pub fn with_scan_indicator(mut self, duration: Duration) -> Self {
        self.scan_indicator_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With request timeout
    #[inline]
    #[must_use]
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// With download file name
    #[inline]
    #[must_use]
    pub fn with_download_filename(mut self, filename: impl Into<String>) -> Self {
        self.download_filename = filename.into();
        self
    }

    /// Parse from TOML text; missing keys keep their defaults
    ///
    /// # Errors
    /// TOML syntax or schema errors, then [`validate`](Self::validate) errors
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    ///
    /// # Errors
    /// I/O, parse or validation errors
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `MEDILAB_*` overrides from the process environment
    ///
    /// # Errors
    /// Unparsable override values
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup
    ///
    /// # Errors
    /// Unparsable override values
    pub fn apply_env_with(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(base_url) = lookup(ENV_BASE_URL) {
            tracing::debug!(base_url = %base_url, "base URL overridden from environment");
            self.base_url = base_url;
        }
        if let Some(raw) = lookup(ENV_SCAN_INDICATOR_MS) {
            self.scan_indicator_ms =
                raw.trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
                        field: "scan_indicator_ms",
                        reason: e.to_string(),
                    })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check URLs and ranges
    ///
    /// # Errors
    /// First invalid field found
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base()?;
        for path in [&self.upload_path, &self.diagnosis_path, &self.history_path] {
            self.endpoint(path)?;
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.download_filename.trim().is_empty()
            || self.download_filename.contains(['/', '\\'])
        {
            return Err(ConfigError::InvalidValue {
                field: "download_filename",
                reason: "must be a bare file name".to_string(),
            });
        }
        Ok(())
    }

    /// Scanning indicator duration
    #[inline]
    #[must_use]
    pub fn scan_indicator(&self) -> Duration {
        Duration::from_millis(self.scan_indicator_ms)
    }

    /// Request timeout
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Upload endpoint
    ///
    /// # Errors
    /// Invalid base URL or path
    pub fn upload_url(&self) -> Result<Url, ConfigError> {
        self.endpoint(&self.upload_path)
    }

    /// Diagnosis endpoint
    ///
    /// # Errors
    /// Invalid base URL or path
    pub fn diagnosis_url(&self) -> Result<Url, ConfigError> {
        self.endpoint(&self.diagnosis_path)
    }

    /// History endpoint
    ///
    /// # Errors
    /// Invalid base URL or path
    pub fn history_url(&self) -> Result<Url, ConfigError> {
        self.endpoint(&self.history_path)
    }

    fn base(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidUrl {
            value: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                value: self.base_url.clone(),
                reason: format!("unsupported scheme `{}`", url.scheme()),
            });
        }
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
        self.base()?;
        // Url::join would drop any path prefix on the base without a trailing slash
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let joined = format!("{base}/{path}");
        Url::parse(&joined).map_err(|e| ConfigError::InvalidUrl {
            value: joined,
            reason: e.to_string(),
        })
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            upload_path: "/image/upload_xray_photo".to_string(),
            diagnosis_path: "/xray/xray_diagnosis".to_string(),
            history_path: "/inquiries/my_diagnoses".to_string(),
            scan_indicator_ms: 4_000,
            request_timeout_secs: 120,
            report_mime: PDF_MIME.to_string(),
            download_filename: DEFAULT_FILENAME.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_backend() {
        let config = WorkflowConfig::new();
        assert_eq!(
            config.upload_url().unwrap().as_str(),
            "http://localhost:5000/image/upload_xray_photo"
        );
        assert_eq!(
            config.diagnosis_url().unwrap().as_str(),
            "http://localhost:5000/xray/xray_diagnosis"
        );
        assert_eq!(
            config.history_url().unwrap().as_str(),
            "http://localhost:5000/inquiries/my_diagnoses"
        );
        assert_eq!(config.scan_indicator(), Duration::from_secs(4));
        assert_eq!(config.download_filename, "diagnosis.pdf");
    }

    #[test]
    fn base_path_prefix_is_kept() {
        let config = WorkflowConfig::new().with_base_url("https://clinic.example/api/");
        assert_eq!(
            config.history_url().unwrap().as_str(),
            "https://clinic.example/api/inquiries/my_diagnoses"
        );
    }

    #[test]
    fn toml_overrides_selected_keys() {
        let config = WorkflowConfig::from_toml_str(
            r#"
            base_url = "https://medilab.example"
            scan_indicator_ms = 2500
            "#,
        )
        .unwrap();
        assert_eq!(config.base_url, "https://medilab.example");
        assert_eq!(config.scan_indicator(), Duration::from_millis(2500));
        assert_eq!(config.upload_path, "/image/upload_xray_photo");
    }

    #[test]
    fn rejects_bad_base_url() {
        let err = WorkflowConfig::from_toml_str(r#"base_url = "not a url""#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));

        let err = WorkflowConfig::new()
            .with_base_url("ftp://files.example")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));
    }

    #[test]
    fn rejects_zero_timeout_and_path_filenames() {
        assert!(WorkflowConfig::new()
            .with_request_timeout_secs(0)
            .validate()
            .is_err());
        assert!(WorkflowConfig::new()
            .with_download_filename("../evil.pdf")
            .validate()
            .is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let config = WorkflowConfig::new()
            .apply_env_with(|key| match key {
                ENV_BASE_URL => Some("https://staging.example".to_string()),
                ENV_SCAN_INDICATOR_MS => Some("100".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.base_url, "https://staging.example");
        assert_eq!(config.scan_indicator_ms, 100);
    }

    #[test]
    fn env_override_must_be_numeric() {
        let err = WorkflowConfig::new()
            .apply_env_with(|key| (key == ENV_SCAN_INDICATOR_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "scan_indicator_ms",
                ..
            }
        ));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medilab.toml");
        std::fs::write(&path, "request_timeout_secs = 30\n").unwrap();
        let config = WorkflowConfig::load(&path).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));

        let missing = WorkflowConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
