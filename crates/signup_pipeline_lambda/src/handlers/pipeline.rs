use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::handlers::validate::decode_signup_request;
use crate::runtime::contract::{ErrorClass, ErrorKind, StageFailure, PIPELINE_SCHEMA_VERSION};
use crate::runtime::orchestrator::{Orchestrator, PipelineReport, PipelineState};
use crate::runtime::stages::SignupStages;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiGatewayResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: Value,
    pub body: String,
}

/// Caller-facing summary of a terminal pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SignupOutcome {
    #[serde(rename_all = "camelCase")]
    Completed {
        account_id: String,
        email: String,
        message: String,
        attempts: u32,
        schema_version: String,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        error_kind: ErrorKind,
        cause: String,
        attempts: u32,
        schema_version: String,
    },
}

impl SignupOutcome {
    pub fn from_report(report: &PipelineReport) -> Self {
        match &report.state {
            PipelineState::Completed { account, receipt } => Self::Completed {
                account_id: account.account_id().to_string(),
                email: account.email().to_string(),
                message: receipt.message().to_string(),
                attempts: report.attempts,
                schema_version: PIPELINE_SCHEMA_VERSION.to_string(),
            },
            PipelineState::Failed { record, .. } => Self::Failed {
                error_kind: record.error_kind,
                cause: record.cause.clone(),
                attempts: report.attempts,
                schema_version: PIPELINE_SCHEMA_VERSION.to_string(),
            },
            // `Orchestrator::run` only returns terminal states.
            other => Self::Failed {
                error_kind: ErrorKind::StageUnavailable,
                cause: format!("orchestrator: run ended in phase {:?}", other.phase()),
                attempts: report.attempts,
                schema_version: PIPELINE_SCHEMA_VERSION.to_string(),
            },
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Completed { .. } => 201,
            Self::Failed { error_kind, .. } => match error_kind.class() {
                ErrorClass::Input => 400,
                ErrorClass::Conflict => 409,
                ErrorClass::Resource => 503,
            },
        }
    }
}

/// API Gateway entry point: decodes the signup request and runs it through
/// the orchestrator. Undecodable payloads are still routed to the failure
/// stage.
pub fn handle_signup_event<S: SignupStages>(
    event: Value,
    orchestrator: &Orchestrator<S>,
) -> ApiGatewayResponse {
    let report = match normalize_apigw_event(event).and_then(decode_signup_request) {
        Ok(request) => orchestrator.run(request),
        Err(failure) => orchestrator.reject(failure),
    };

    let outcome = SignupOutcome::from_report(&report);
    json_response(outcome.status_code(), &outcome)
}

/// Partial-batch response understood by the SQS event source mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SqsBatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

pub fn is_sqs_event(event: &Value) -> bool {
    event
        .get("Records")
        .and_then(Value::as_array)
        .map(|records| {
            !records.is_empty()
                && records.iter().all(|record| {
                    record
                        .get("eventSource")
                        .and_then(Value::as_str)
                        .map(|source| source == "aws:sqs")
                        .unwrap_or(false)
                })
        })
        .unwrap_or(false)
}

/// Runs every queued signup request. Messages whose run ended in a
/// retryable failure are reported back so the queue redelivers them.
pub fn handle_sqs_batch<S: SignupStages>(
    event: &Value,
    orchestrator: &Orchestrator<S>,
) -> Result<SqsBatchResponse, String> {
    let records = event
        .get("Records")
        .and_then(Value::as_array)
        .ok_or_else(|| "SQS event must include Records array".to_string())?;

    let mut batch_item_failures = Vec::new();
    for record in records {
        let message_id = record
            .get("messageId")
            .and_then(Value::as_str)
            .ok_or_else(|| "SQS record must carry a messageId".to_string())?;
        let body = record
            .get("body")
            .and_then(Value::as_str)
            .ok_or_else(|| "SQS record body must be a string".to_string())?;

        let report = match serde_json::from_str::<Value>(body)
            .map_err(|error| {
                StageFailure::new(
                    ErrorKind::MalformedPayload,
                    format!("Malformed JSON body: {error}"),
                )
            })
            .and_then(decode_signup_request)
        {
            Ok(request) => orchestrator.run(request),
            Err(failure) => orchestrator.reject(failure),
        };

        let retryable = report
            .failure()
            .is_some_and(|failure| failure.error_kind.is_retryable());
        if retryable {
            batch_item_failures.push(BatchItemFailure {
                item_identifier: message_id.to_string(),
            });
        }
    }

    Ok(SqsBatchResponse {
        batch_item_failures,
    })
}

fn normalize_apigw_event(event: Value) -> Result<Value, StageFailure> {
    let Some(object) = event.as_object() else {
        return Err(StageFailure::new(
            ErrorKind::MalformedPayload,
            "Request payload must be a JSON object",
        ));
    };

    let Some(body) = object.get("body") else {
        return Ok(event);
    };

    match body {
        Value::Null => Ok(json!({})),
        Value::Object(_) => Ok(body.clone()),
        Value::String(text) => serde_json::from_str(text).map_err(|error| {
            StageFailure::new(
                ErrorKind::MalformedPayload,
                format!("Malformed JSON body: {error}"),
            )
        }),
        _ => Err(StageFailure::new(
            ErrorKind::MalformedPayload,
            "Request body must be a JSON object",
        )),
    }
}

pub fn misconfiguration_response(message: &str) -> ApiGatewayResponse {
    json_response(
        500,
        &json!({
            "error": "misconfiguration",
            "message": message,
        }),
    )
}

fn json_response(status_code: u16, payload: &impl Serialize) -> ApiGatewayResponse {
    let body = serde_json::to_string(payload).unwrap_or_else(|error| {
        json!({
            "error": "serialization_error",
            "message": error.to_string(),
        })
        .to_string()
    });

    ApiGatewayResponse {
        status_code,
        headers: json!({"Content-Type": "application/json"}),
        body,
    }
}
