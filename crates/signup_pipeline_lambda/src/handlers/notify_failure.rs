use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use crate::adapters::object_store::ObjectStore;
use crate::runtime::contract::{ErrorKind, FailureAck, FailureRecord, StageEnvelope};
use crate::runtime::storage_keys::failure_object_key;

pub const FAILURE_RECORD_SCHEMA_VERSION: &str = "v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureSinkConfig {
    pub prefix: String,
    pub run_date: String,
    pub event_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredFailureRecord {
    pub failure_id: String,
    pub error_kind: ErrorKind,
    pub cause: String,
    pub event_time: String,
    pub record_schema: String,
}

/// Persists the failure record. Never fails: when the sink is unavailable
/// the record is written to the local log instead and the ack says so.
pub fn record_failure(
    record: &FailureRecord,
    store: &impl ObjectStore,
    config: &FailureSinkConfig,
) -> FailureAck {
    let failure_id = Uuid::new_v4().to_string();
    let key = failure_object_key(&config.prefix, &config.run_date, &failure_id);
    let stored = StoredFailureRecord {
        failure_id,
        error_kind: record.error_kind,
        cause: record.cause.clone(),
        event_time: config.event_time.clone(),
        record_schema: FAILURE_RECORD_SCHEMA_VERSION.to_string(),
    };

    let written = serde_json::to_vec(&stored)
        .map_err(|error| format!("failed to serialize failure record: {error}"))
        .and_then(|body| store.write_object(&key, &body));

    match written {
        Ok(()) => {
            info!(
                component = "failure_stage",
                event = "failure_recorded",
                error_kind = record.error_kind.as_str(),
                failure_key = %key,
            );
            FailureAck::recorded()
        }
        Err(sink_error) => {
            record_locally(record, &sink_error);
            FailureAck::recorded_locally()
        }
    }
}

/// Best-effort fallback used whenever the durable sink cannot be reached.
pub fn record_locally(record: &FailureRecord, reason: &str) {
    error!(
        component = "failure_stage",
        event = "failure_recorded_locally",
        error_kind = record.error_kind.as_str(),
        cause = %record.cause,
        reason,
    );
}

/// Failure stage entry point. Always answers with a success envelope whose
/// ack says whether the record only reached the local log.
pub fn handle_failure_payload(
    payload: Value,
    store: &impl ObjectStore,
    config: &FailureSinkConfig,
) -> StageEnvelope<FailureAck> {
    let record = serde_json::from_value::<FailureRecord>(payload).unwrap_or_else(|error| {
        FailureRecord {
            error_kind: ErrorKind::MalformedPayload,
            cause: format!("failure: undecodable failure payload: {error}"),
        }
    });
    StageEnvelope::Success(record_failure(&record, store, config))
}
