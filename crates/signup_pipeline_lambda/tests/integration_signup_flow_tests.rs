mod support;

use rstest::rstest;
use serde_json::json;
use signup_pipeline_lambda::handlers::pipeline::{handle_signup_event, SignupOutcome};
use signup_pipeline_lambda::runtime::contract::{ErrorKind, SignupRequest, StageName};
use signup_pipeline_lambda::runtime::orchestrator::{OrchestratorConfig, PipelineState};
use support::{
    local_stages, orchestrator, retrying, server_secret, single_attempt, FlakyAccountStore,
    RecordingDispatcher,
};

#[test]
fn valid_signup_completes_with_account_and_receipt() {
    let orchestrator = orchestrator(
        local_stages(FlakyAccountStore::default(), RecordingDispatcher::default()),
        single_attempt(),
    );

    let report = orchestrator.run(SignupRequest::new("a@b.com", "secret1"));

    let account = report.account().expect("run should complete");
    assert!(!account.account_id().is_empty());
    assert_eq!(
        report.receipt().map(|receipt| receipt.message()),
        Some("Verification email sent")
    );
    assert_eq!(report.failure_ack, None);

    let stages = orchestrator.stages();
    let stored = stages.accounts.inner.get("a@b.com").expect("account persisted");
    assert_eq!(stored.account_id, account.account_id());
    assert_eq!(stages.dispatcher.messages().len(), 1);
    assert!(stages.failure_store.failure_records().is_empty());
}

#[test]
fn blank_email_fails_validation_and_records_failure_once() {
    let orchestrator = orchestrator(
        local_stages(FlakyAccountStore::default(), RecordingDispatcher::default()),
        single_attempt(),
    );

    let report = orchestrator.run(SignupRequest::new("", "secret1"));

    match &report.state {
        PipelineState::Failed { stage, record } => {
            assert_eq!(*stage, StageName::Validation);
            assert_eq!(record.error_kind, ErrorKind::MissingField);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    let stages = orchestrator.stages();
    assert!(stages.accounts.inner.is_empty());
    assert_eq!(stages.dispatcher.attempts(), 0);
    let records = stages.failure_store.failure_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].error_kind, ErrorKind::MissingField);
}

#[test]
fn store_outage_fails_creation_and_skips_notification() {
    let orchestrator = orchestrator(
        local_stages(FlakyAccountStore::failing(1), RecordingDispatcher::default()),
        single_attempt(),
    );

    let report = orchestrator.run(SignupRequest::new("a@b.com", "secret1"));

    assert_eq!(
        report.failure().map(|record| record.error_kind),
        Some(ErrorKind::StoreUnavailable)
    );
    let stages = orchestrator.stages();
    assert_eq!(stages.dispatcher.attempts(), 0);
    assert_eq!(stages.failure_store.failure_records().len(), 1);
}

#[test]
fn transient_store_outage_is_retried_from_the_start() {
    let orchestrator = orchestrator(
        local_stages(FlakyAccountStore::failing(1), RecordingDispatcher::default()),
        retrying(3),
    );

    let report = orchestrator.run(SignupRequest::new("a@b.com", "secret1"));

    assert!(report.is_completed());
    assert_eq!(report.attempts, 2);
    assert!(orchestrator.stages().failure_store.failure_records().is_empty());
}

#[test]
fn replayed_request_reuses_account_and_deduplication_id() {
    let orchestrator = orchestrator(
        local_stages(FlakyAccountStore::default(), RecordingDispatcher::default()),
        single_attempt(),
    );
    let request = SignupRequest::new("a@b.com", "secret1").with_idempotency_key("req-7");

    let first = orchestrator.run(request.clone());
    let second = orchestrator.run(request);

    let first_account = first.account().expect("first run completes");
    let second_account = second.account().expect("replay completes");
    assert_eq!(first_account.account_id(), second_account.account_id());

    let messages = orchestrator.stages().dispatcher.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].deduplication_id, messages[1].deduplication_id);
}

#[test]
fn persisted_and_dispatched_keys_are_sealed_under_the_server_secret() {
    let orchestrator = orchestrator(
        local_stages(FlakyAccountStore::default(), RecordingDispatcher::default()),
        single_attempt(),
    );

    let report = orchestrator.run(SignupRequest::new("a@b.com", "secret1"));

    let account = report.account().expect("run should complete");
    let sealed = account.idempotency_key().seal(&server_secret());
    let stages = orchestrator.stages();
    let stored = stages.accounts.inner.get("a@b.com").expect("account persisted");
    assert_eq!(stored.idempotency_key, sealed);
    assert_ne!(stored.idempotency_key, account.idempotency_key().as_str());
    assert_eq!(stages.dispatcher.messages()[0].deduplication_id, sealed);
}

#[test]
fn second_registration_for_same_email_conflicts() {
    let orchestrator = orchestrator(
        local_stages(FlakyAccountStore::default(), RecordingDispatcher::default()),
        retrying(3),
    );

    orchestrator.run(SignupRequest::new("a@b.com", "secret1"));
    let report = orchestrator.run(SignupRequest::new("A@B.com", "another-secret"));

    assert_eq!(report.attempts, 1);
    assert_eq!(
        report.failure().map(|record| record.error_kind),
        Some(ErrorKind::DuplicateAccount)
    );
}

#[test]
fn notification_failure_keeps_account_unless_compensation_is_enabled() {
    let kept = orchestrator(
        local_stages(FlakyAccountStore::default(), RecordingDispatcher::refusing()),
        single_attempt(),
    );
    let report = kept.run(SignupRequest::new("a@b.com", "secret1"));
    assert_eq!(
        report.failure().map(|record| record.error_kind),
        Some(ErrorKind::DispatchUnavailable)
    );
    assert_eq!(kept.stages().accounts.inner.len(), 1);

    let compensated = orchestrator(
        local_stages(FlakyAccountStore::default(), RecordingDispatcher::refusing()),
        OrchestratorConfig {
            compensate_on_notify_failure: true,
            ..single_attempt()
        },
    );
    let report = compensated.run(SignupRequest::new("a@b.com", "secret1"));
    assert_eq!(
        report.failure().map(|record| record.error_kind),
        Some(ErrorKind::DispatchUnavailable)
    );
    assert!(compensated.stages().accounts.inner.is_empty());
    assert_eq!(compensated.stages().failure_store.failure_records().len(), 1);
}

#[test]
fn api_gateway_event_runs_the_full_pipeline() {
    let orchestrator = orchestrator(
        local_stages(FlakyAccountStore::default(), RecordingDispatcher::default()),
        single_attempt(),
    );

    let response = handle_signup_event(
        json!({"body": "{\"email\":\"a@b.com\",\"password\":\"secret1\"}"}),
        &orchestrator,
    );

    assert_eq!(response.status_code, 201);
    let outcome: SignupOutcome = serde_json::from_str(&response.body).expect("body should parse");
    assert!(matches!(outcome, SignupOutcome::Completed { attempts: 1, .. }));
}

#[rstest]
#[case(json!({"email": "", "password": "secret1"}), ErrorKind::MissingField)]
#[case(json!({"email": "a@b.com"}), ErrorKind::MissingField)]
#[case(json!({"email": "a@b", "password": "secret1"}), ErrorKind::InvalidFormat)]
#[case(json!({"email": "a@b.com", "password": "12345"}), ErrorKind::WeakPassword)]
#[case(json!({"email": 42, "password": "secret1"}), ErrorKind::MalformedPayload)]
fn input_errors_answer_bad_request(#[case] body: serde_json::Value, #[case] expected: ErrorKind) {
    let orchestrator = orchestrator(
        local_stages(FlakyAccountStore::default(), RecordingDispatcher::default()),
        single_attempt(),
    );

    let response = handle_signup_event(body, &orchestrator);

    assert_eq!(response.status_code, 400);
    match serde_json::from_str::<SignupOutcome>(&response.body).expect("body should parse") {
        SignupOutcome::Failed { error_kind, .. } => assert_eq!(error_kind, expected),
        other => panic!("expected failure, got {other:?}"),
    }
    let records = orchestrator.stages().failure_store.failure_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].error_kind, expected);
}
