//! Report history for the current identity
//!
//! History never fails towards the presentation layer: transport or parse
//! problems yield an empty list plus a message, and a record whose payload
//! will not decode is kept with its payload marked undecodable.

use crate::backend::DiagnosticBackend;
use crate::types::ImageLocator;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use medilab_artifact::{
    wrap_for_download, DecodeError, ObjectUrlRegistry, ReportArtifact, SaveTarget, SavedFile,
};
use medilab_session::{Credential, SessionGate};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Embedded report of a history record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchivedReport {
    /// Payload decoded
    Decoded(ReportArtifact),
    /// Payload present but not valid base64
    Undecodable(DecodeError),
    /// No payload in the record
    Missing,
}

impl ArchivedReport {
    /// Decoded report, if any
    #[inline]
    #[must_use]
    pub fn report(&self) -> Option<&ReportArtifact> {
        match self {
            Self::Decoded(report) => Some(report),
            _ => None,
        }
    }
}

/// One previously produced report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    /// Identity the history was fetched for
    pub identity: Option<String>,
    /// Parsed `date_result`
    pub captured_at: Option<DateTime<Utc>>,
    /// `date_result` as received
    pub date_raw: Option<String>,
    /// `image_diagnostic`
    pub image: Option<ImageLocator>,
    /// `pdf_data` as received (archival form)
    pub archival: Option<String>,
    /// Decoded `pdf_data`
    pub report: ArchivedReport,
}

/// Result of a per-record download action
#[derive(Debug)]
pub enum DownloadOutcome {
    /// File handed to the host
    Saved(SavedFile),
    /// Nothing to save: payload missing or undecodable
    NoData,
    /// Host failed to save; object URL was still released
    Failed(String),
}

impl DownloadOutcome {
    /// Whether a file was saved
    #[inline]
    #[must_use]
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }
}

impl HistoryRecord {
    /// Whether the payload decoded
    #[inline]
    #[must_use]
    pub fn is_decodable(&self) -> bool {
        matches!(self.report, ArchivedReport::Decoded(_))
    }

    /// Save this record's report through `target`
    ///
    /// Never fails: a missing or undecodable payload is `NoData`, a host
    /// failure is `Failed` with a user-facing message.
    pub fn download(
        &self,
        registry: &ObjectUrlRegistry,
        target: &dyn SaveTarget,
        filename: &str,
    ) -> DownloadOutcome {
        let ArchivedReport::Decoded(report) = &self.report else {
            tracing::info!(date = ?self.date_raw, "no report data available for record");
            return DownloadOutcome::NoData;
        };

        match wrap_for_download(registry, report.bytes().to_vec(), report.mime())
            .with_filename(filename)
            .trigger(target)
        {
            Ok(saved) => DownloadOutcome::Saved(saved),
            Err(e) => DownloadOutcome::Failed(format!("Failed to process report download: {e}")),
        }
    }
}

/// Fetched history plus any message meant for display
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryView {
    /// Records, in server order
    pub records: Vec<HistoryRecord>,
    /// Human-readable error, kept apart from the (then empty) records
    pub message: Option<String>,
}

impl HistoryView {
    /// Number of records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if there are no records
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records whose payload decoded
    #[must_use]
    pub fn decodable_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_decodable()).count()
    }
}

/// Fetches and decodes the history collection
#[derive(Debug)]
pub struct HistoryStage<B> {
    backend: Arc<B>,
    gate: SessionGate,
    mime: String,
}

impl<B: DiagnosticBackend> HistoryStage<B> {
    /// Create stage over a shared backend
    #[inline]
    #[must_use]
    pub fn new(backend: Arc<B>, gate: SessionGate, mime: impl Into<String>) -> Self {
        Self {
            backend,
            gate,
            mime: mime.into(),
        }
    }

    /// Fetch history for the credential's identity
    ///
    /// Gated: an unusable credential yields an empty view without a request.
    pub async fn fetch(&self, credential: &Credential) -> HistoryView {
        if !self.gate.is_usable(credential) {
            tracing::debug!("history skipped: credential not usable");
            return HistoryView::default();
        }
        let identity = self.gate.subject(credential);

        match self.backend.fetch_history(credential).await {
            Ok(body) => {
                let records = parse_history(body, identity.as_deref(), &self.mime);
                tracing::info!(count = records.len(), "history fetched");
                HistoryView {
                    records,
                    message: None,
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "error fetching history");
                HistoryView {
                    records: Vec::new(),
                    message: Some(format!("Error fetching diagnoses: {e}")),
                }
            }
        }
    }
}

/// Turn a raw history body into records
///
/// A body that is not an array is treated as empty. Array elements that
/// are not objects are skipped. Fields of the wrong JSON type are read as
/// absent, except a non-string `pdf_data`, which marks the payload
/// undecodable so the record still shows up.
#[must_use]
pub fn parse_history(body: Value, identity: Option<&str>, mime: &str) -> Vec<HistoryRecord> {
    let Value::Array(items) = body else {
        tracing::warn!("history body is not an array; treating as empty");
        return Vec::new();
    };

    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match item {
            Value::Object(fields) => Some(decode_record(&fields, identity, mime, index)),
            other => {
                tracing::warn!(index, kind = json_kind(&other), "skipping non-object history entry");
                None
            }
        })
        .collect()
}

fn decode_record(
    fields: &Map<String, Value>,
    identity: Option<&str>,
    mime: &str,
    index: usize,
) -> HistoryRecord {
    let date_raw = string_field(fields, "date_result", index);
    let captured_at = date_raw.as_deref().and_then(parse_record_date);

    let archival = fields.get("pdf_data").and_then(Value::as_str).map(str::to_string);
    let report = match fields.get("pdf_data") {
        None | Some(Value::Null) => ArchivedReport::Missing,
        Some(Value::String(payload)) if payload.is_empty() => ArchivedReport::Missing,
        Some(Value::String(payload)) => {
            let stamp = captured_at.unwrap_or_default();
            match ReportArtifact::from_archival(payload, mime, stamp) {
                Ok(report) => ArchivedReport::Decoded(report),
                Err(e) => {
                    tracing::warn!(index, error = %e, "history record payload undecodable");
                    ArchivedReport::Undecodable(e)
                }
            }
        }
        Some(other) => {
            let kind = json_kind(other);
            tracing::warn!(index, kind, "history record payload is not a string");
            ArchivedReport::Undecodable(DecodeError::InvalidBase64(format!(
                "expected a base64 string, found {kind}"
            )))
        }
    };

    HistoryRecord {
        identity: identity.map(str::to_string),
        captured_at,
        date_raw,
        image: string_field(fields, "image_diagnostic", index)
            .filter(|u| !u.trim().is_empty())
            .map(ImageLocator::new),
        archival,
        report,
    }
}

fn string_field(fields: &Map<String, Value>, key: &str, index: usize) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => {
            tracing::debug!(index, key, kind = json_kind(other), "ignoring non-string field");
            None
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse the backend's `date_result`
///
/// Accepts RFC 3339, RFC 2822 (Flask's JSON date form), naive ISO-8601
/// with `T` or space separator, and bare dates. Naive values are UTC.
#[must_use]
pub fn parse_record_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
