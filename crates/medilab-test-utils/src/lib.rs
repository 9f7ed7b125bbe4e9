//! Testing utilities for the Medilab workspace
//!
//! Shared fakes, credential builders and history fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use medilab_artifact::{SaveRequest, SaveTarget};
use medilab_session::Credential;
use medilab_workflow::{DiagnosticBackend, ImageFile, ImageLocator, TransportError};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Response played back by [`FakeBackend`] after `delay`
#[derive(Debug, Clone)]
pub struct Scripted<T> {
    pub delay: Duration,
    pub result: Result<T, TransportError>,
}

impl<T> Scripted<T> {
    pub fn ok(value: T) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(value),
        }
    }

    pub fn err(error: TransportError) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(error),
        }
    }

    #[must_use]
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Backend that replays queued responses in order
///
/// An exhausted queue answers with `TransportError::Network`.
#[derive(Debug, Default)]
pub struct FakeBackend {
    uploads: Mutex<VecDeque<Scripted<ImageLocator>>>,
    diagnoses: Mutex<VecDeque<Scripted<Vec<u8>>>>,
    histories: Mutex<VecDeque<Scripted<Value>>>,
    upload_calls: AtomicUsize,
    diagnosis_calls: AtomicUsize,
    history_calls: AtomicUsize,
    authorizations: Mutex<Vec<String>>,
    uploaded_names: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_upload(mut self, response: Scripted<ImageLocator>) -> Self {
        self.uploads.get_mut().push_back(response);
        self
    }

    #[must_use]
    pub fn upload_ok(self, url: &str) -> Self {
        self.with_upload(Scripted::ok(ImageLocator::new(url)))
    }

    #[must_use]
    pub fn with_diagnosis(mut self, response: Scripted<Vec<u8>>) -> Self {
        self.diagnoses.get_mut().push_back(response);
        self
    }

    #[must_use]
    pub fn diagnosis_ok(self, bytes: &[u8], delay: Duration) -> Self {
        self.with_diagnosis(Scripted::ok(bytes.to_vec()).after(delay))
    }

    #[must_use]
    pub fn with_history(mut self, response: Scripted<Value>) -> Self {
        self.histories.get_mut().push_back(response);
        self
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn diagnosis_calls(&self) -> usize {
        self.diagnosis_calls.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    /// `Authorization` values seen, in call order
    pub fn authorizations(&self) -> Vec<String> {
        self.authorizations.lock().clone()
    }

    pub fn uploaded_names(&self) -> Vec<String> {
        self.uploaded_names.lock().clone()
    }

    fn record(&self, counter: &AtomicUsize, credential: &Credential) {
        counter.fetch_add(1, Ordering::SeqCst);
        self.authorizations.lock().push(credential.as_str().to_string());
    }
}

async fn play<T>(queue: &Mutex<VecDeque<Scripted<T>>>, endpoint: &str) -> Result<T, TransportError> {
    let next = queue.lock().pop_front();
    match next {
        Some(scripted) => {
            if !scripted.delay.is_zero() {
                tokio::time::sleep(scripted.delay).await;
            }
            scripted.result
        }
        None => Err(TransportError::Network(format!(
            "no scripted {endpoint} response"
        ))),
    }
}

#[async_trait]
impl DiagnosticBackend for FakeBackend {
    async fn upload_image(
        &self,
        image: &ImageFile,
        credential: &Credential,
    ) -> Result<ImageLocator, TransportError> {
        self.record(&self.upload_calls, credential);
        self.uploaded_names.lock().push(image.name().to_string());
        play(&self.uploads, "upload").await
    }

    async fn request_diagnosis(
        &self,
        _locator: &ImageLocator,
        credential: &Credential,
    ) -> Result<Vec<u8>, TransportError> {
        self.record(&self.diagnosis_calls, credential);
        play(&self.diagnoses, "diagnosis").await
    }

    async fn fetch_history(&self, credential: &Credential) -> Result<Value, TransportError> {
        self.record(&self.history_calls, credential);
        play(&self.histories, "history").await
    }
}

fn jwt(payload: &Value) -> Credential {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    Credential::new(format!("{header}.{body}.test-signature"))
}

/// Credential without an expiry, as the clinic backend issues them
pub fn credential_for(subject: &str) -> Credential {
    jwt(&json!({ "dni": subject, "iat": 1_700_000_000 }))
}

/// Credential expiring at `exp` (seconds since epoch)
pub fn credential_expiring_at(subject: &str, exp: i64) -> Credential {
    jwt(&json!({ "dni": subject, "iat": 1_000, "exp": exp }))
}

/// Credential that expired long ago
pub fn expired_credential() -> Credential {
    credential_expiring_at("expired", 2_000)
}

/// One history record whose report is `pdf`
pub fn history_record(date: &str, image_url: &str, pdf: &[u8]) -> Value {
    json!({
        "date_result": date,
        "image_diagnostic": image_url,
        "pdf_data": STANDARD.encode(pdf),
    })
}

/// One history record with an arbitrary `pdf_data` value
pub fn history_record_raw(date: &str, image_url: &str, pdf_data: &str) -> Value {
    json!({
        "date_result": date,
        "image_diagnostic": image_url,
        "pdf_data": pdf_data,
    })
}

/// Minimal PDF-looking bytes
pub fn sample_pdf(tag: &str) -> Vec<u8> {
    format!("%PDF-1.4\n% {tag}\n%%EOF\n").into_bytes()
}

/// Image file with PNG magic
pub fn sample_image(name: &str) -> ImageFile {
    ImageFile::new(name, b"\x89PNG\r\n\x1a\nfake-xray".to_vec())
}

/// What a [`RecordingTarget`] was asked to save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedCall {
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
    pub url: String,
}

/// In-memory [`SaveTarget`] that records every request
#[derive(Debug, Default)]
pub struct RecordingTarget {
    calls: Mutex<Vec<SavedCall>>,
    fail: bool,
}

impl RecordingTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target whose every save fails with `PermissionDenied`
    pub fn failing() -> Self {
        Self {
            calls: Mutex::default(),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<SavedCall> {
        self.calls.lock().clone()
    }
}

impl SaveTarget for RecordingTarget {
    fn save(&self, request: &SaveRequest<'_>) -> io::Result<PathBuf> {
        self.calls.lock().push(SavedCall {
            filename: request.filename.to_string(),
            mime: request.mime.to_string(),
            bytes: request.bytes.to_vec(),
            url: request.url.as_str().to_string(),
        });
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "save refused"));
        }
        Ok(PathBuf::from("memory").join(request.filename))
    }
}
