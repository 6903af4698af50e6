#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use signup_pipeline_lambda::adapters::account_store::{
    AccountRecord, AccountStore, InMemoryAccountStore, InsertOutcome,
};
use signup_pipeline_lambda::adapters::dispatch::{ConfirmationDispatcher, ConfirmationMessage};
use signup_pipeline_lambda::adapters::object_store::ObjectStore;
use signup_pipeline_lambda::handlers::notify_failure::{FailureSinkConfig, StoredFailureRecord};
use signup_pipeline_lambda::runtime::idempotency::IdempotencySecret;
use signup_pipeline_lambda::runtime::orchestrator::{
    Orchestrator, OrchestratorConfig, RetryPolicy,
};
use signup_pipeline_lambda::stages::LocalStages;

pub const RUN_DATE: &str = "2026-02-14";
pub const EVENT_TIME: &str = "2026-02-14T00:00:00Z";
pub const SERVER_SECRET: &[u8] = b"integration-test-secret";

pub fn server_secret() -> IdempotencySecret {
    IdempotencySecret::new(SERVER_SECRET).expect("hmac accepts any key length")
}

/// Accepts or refuses every message and keeps what it accepted.
#[derive(Default)]
pub struct RecordingDispatcher {
    refuse: bool,
    messages: Mutex<Vec<ConfirmationMessage>>,
    attempts: Mutex<usize>,
}

impl RecordingDispatcher {
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<ConfirmationMessage> {
        self.messages.lock().expect("poisoned mutex").clone()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().expect("poisoned mutex")
    }
}

impl ConfirmationDispatcher for RecordingDispatcher {
    fn dispatch(&self, message: &ConfirmationMessage) -> Result<(), String> {
        *self.attempts.lock().expect("poisoned mutex") += 1;
        if self.refuse {
            return Err("queue endpoint unreachable".to_string());
        }
        self.messages
            .lock()
            .expect("poisoned mutex")
            .push(message.clone());
        Ok(())
    }
}

/// Account store that fails the first `outages` calls, then delegates.
#[derive(Default)]
pub struct FlakyAccountStore {
    outages: Mutex<usize>,
    pub inner: InMemoryAccountStore,
}

impl FlakyAccountStore {
    pub fn failing(outages: usize) -> Self {
        Self {
            outages: Mutex::new(outages),
            inner: InMemoryAccountStore::new(),
        }
    }

    fn take_outage(&self) -> bool {
        let mut outages = self.outages.lock().expect("poisoned mutex");
        if *outages == 0 {
            return false;
        }
        *outages -= 1;
        true
    }
}

impl AccountStore for FlakyAccountStore {
    fn insert_if_absent(&self, record: &AccountRecord) -> Result<InsertOutcome, String> {
        if self.take_outage() {
            return Err("account store unreachable".to_string());
        }
        self.inner.insert_if_absent(record)
    }

    fn remove(&self, email: &str, account_id: &str) -> Result<bool, String> {
        self.inner.remove(email, account_id)
    }
}

#[derive(Default)]
pub struct RecordingObjectStore {
    writes: Mutex<HashMap<String, Vec<u8>>>,
}

impl RecordingObjectStore {
    pub fn failure_records(&self) -> Vec<StoredFailureRecord> {
        self.writes
            .lock()
            .expect("poisoned mutex")
            .values()
            .map(|body| serde_json::from_slice(body).expect("failure record should parse"))
            .collect()
    }
}

impl ObjectStore for RecordingObjectStore {
    fn write_object(&self, key: &str, body: &[u8]) -> Result<(), String> {
        self.writes
            .lock()
            .expect("poisoned mutex")
            .insert(key.to_string(), body.to_vec());
        Ok(())
    }
}

pub type TestStages = LocalStages<FlakyAccountStore, RecordingDispatcher, RecordingObjectStore>;

pub fn local_stages(accounts: FlakyAccountStore, dispatcher: RecordingDispatcher) -> TestStages {
    LocalStages {
        accounts,
        dispatcher,
        failure_store: RecordingObjectStore::default(),
        failure_sink: FailureSinkConfig {
            prefix: "signup/failures".to_string(),
            run_date: RUN_DATE.to_string(),
            event_time: EVENT_TIME.to_string(),
        },
        created_at: EVENT_TIME.to_string(),
        idempotency_secret: server_secret(),
    }
}

pub fn orchestrator(stages: TestStages, config: OrchestratorConfig) -> Orchestrator<TestStages> {
    Orchestrator::new(stages, config)
}

pub fn single_attempt() -> OrchestratorConfig {
    OrchestratorConfig {
        retry: RetryPolicy::no_retry(),
        compensate_on_notify_failure: false,
    }
}

pub fn retrying(max_attempts: u32) -> OrchestratorConfig {
    OrchestratorConfig {
        retry: RetryPolicy {
            max_attempts,
            backoff: std::time::Duration::ZERO,
        },
        compensate_on_notify_failure: false,
    }
}
