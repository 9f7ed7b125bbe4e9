use medilab_session::SessionGate;
use medilab_test_utils::{
    credential_for, expired_credential, history_record, history_record_raw, sample_pdf,
    FakeBackend, RecordingTarget, Scripted,
};
use medilab_workflow::{
    ArchivedReport, DownloadOutcome, TransportError, WorkflowConfig, WorkflowController,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

fn controller(backend: FakeBackend) -> (Arc<FakeBackend>, WorkflowController<FakeBackend>) {
    let backend = Arc::new(backend);
    let controller = WorkflowController::from_shared(
        Arc::clone(&backend),
        WorkflowConfig::new(),
        SessionGate::new(),
    );
    (backend, controller)
}

#[tokio::test]
async fn test_one_corrupt_record_does_not_blank_the_list() {
    let first = sample_pdf("first");
    let third = sample_pdf("third");
    let body = Value::Array(vec![
        history_record("2024-05-01 10:30:00", "https://store/a", &first),
        history_record_raw("2024-05-02 11:00:00", "https://store/b", "%%not base64%%"),
        history_record("2024-05-03 12:15:00", "https://store/c", &third),
    ]);
    let (_backend, wf) = controller(FakeBackend::new().with_history(Scripted::ok(body)));

    let view = wf.fetch_history(&credential_for("30111222")).await;
    assert_eq!(view.len(), 3);
    assert_eq!(view.decodable_count(), 2);
    assert!(view.message.is_none());
    assert!(matches!(view.records[1].report, ArchivedReport::Undecodable(_)));
    assert_eq!(view.records[0].identity.as_deref(), Some("30111222"));

    let target = RecordingTarget::new();
    let outcomes: Vec<DownloadOutcome> = view
        .records
        .iter()
        .map(|record| wf.download_history_record(record, &target))
        .collect();

    assert!(outcomes[0].is_saved());
    assert!(matches!(outcomes[1], DownloadOutcome::NoData));
    assert!(outcomes[2].is_saved());

    let calls = target.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].bytes, first);
    assert_eq!(calls[1].bytes, third);
    assert!(calls.iter().all(|c| c.filename == "diagnosis.pdf"));
    assert_eq!(wf.outstanding_object_urls(), 0);
}

#[tokio::test]
async fn test_data_uri_payload_matches_plain_payload() {
    let pdf = sample_pdf("prefixed");
    let plain = history_record("2024-05-01", "https://store/a", &pdf);
    let prefixed = history_record_raw(
        "2024-05-01",
        "https://store/a",
        &format!(
            "data:application/pdf;base64,{}",
            plain["pdf_data"].as_str().unwrap()
        ),
    );
    let (_backend, wf) = controller(
        FakeBackend::new().with_history(Scripted::ok(json!([plain, prefixed]))),
    );

    let view = wf.fetch_history(&credential_for("1")).await;
    let a = view.records[0].report.report().unwrap();
    let b = view.records[1].report.report().unwrap();
    assert!(a.same_content(b));
    assert_eq!(a.bytes(), pdf.as_slice());
}

#[tokio::test]
async fn test_transport_error_yields_empty_list_and_message() {
    let (_backend, wf) = controller(FakeBackend::new().with_history(Scripted::err(
        TransportError::Status {
            status: 500,
            message: "Database error".into(),
        },
    )));

    let view = wf.fetch_history(&credential_for("1")).await;
    assert!(view.is_empty());
    let message = view.message.unwrap();
    assert!(message.starts_with("Error fetching diagnoses"));
    assert!(message.contains("Database error"));
}

#[tokio::test]
async fn test_unusable_credential_skips_request() {
    let (backend, wf) = controller(FakeBackend::new());

    let view = wf.fetch_history(&expired_credential()).await;
    assert!(view.is_empty());
    assert!(view.message.is_none());
    assert_eq!(backend.history_calls(), 0);
}

#[tokio::test]
async fn test_non_array_body_is_empty_history() {
    let (_backend, wf) = controller(
        FakeBackend::new().with_history(Scripted::ok(json!({ "error": "unexpected" }))),
    );

    let view = wf.fetch_history(&credential_for("1")).await;
    assert!(view.is_empty());
    assert!(view.message.is_none());
}

#[tokio::test]
async fn test_failing_host_reports_failure_and_releases_url() {
    let body = json!([history_record("2024-05-01", "https://store/a", &sample_pdf("x"))]);
    let (_backend, wf) = controller(FakeBackend::new().with_history(Scripted::ok(body)));

    let view = wf.fetch_history(&credential_for("1")).await;
    let outcome = wf.download_history_record(&view.records[0], &RecordingTarget::failing());
    assert!(matches!(outcome, DownloadOutcome::Failed(_)));
    assert_eq!(wf.outstanding_object_urls(), 0);
}
