use serde_json::Value;
use tracing::info;

use crate::runtime::contract::{
    ErrorKind, SignupRequest, StageEnvelope, StageFailure, ValidatedRequest,
};
use crate::runtime::idempotency::email_fingerprint;
use crate::runtime::validation::validate;

/// Validation stage entry point at the invocation boundary.
pub fn handle_validate_payload(payload: Value) -> StageEnvelope<ValidatedRequest> {
    decode_signup_request(payload)
        .and_then(|request| {
            let verdict = validate(&request);
            info!(
                component = "validation_stage",
                event = "request_validated",
                email_hash = %email_fingerprint(&request.email),
                passed = verdict.is_ok(),
            );
            verdict
        })
        .into()
}

pub fn decode_signup_request(payload: Value) -> Result<SignupRequest, StageFailure> {
    serde_json::from_value(payload).map_err(|error| {
        StageFailure::new(
            ErrorKind::MalformedPayload,
            format!("malformed signup request: {error}"),
        )
    })
}
