use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde::Serialize;
use serde_json::Value;
use signup_pipeline_lambda::adapters::aws::{
    S3AccountStore, S3ObjectStore, SqsConfirmationDispatcher,
};
use signup_pipeline_lambda::config::{RuntimeConfig, StageRole};
use signup_pipeline_lambda::handlers::create_account::{
    handle_create_payload, handle_deactivate_payload,
};
use signup_pipeline_lambda::handlers::notify_failure::{handle_failure_payload, FailureSinkConfig};
use signup_pipeline_lambda::handlers::send_confirmation::handle_notify_payload;
use signup_pipeline_lambda::handlers::validate::handle_validate_payload;
use signup_pipeline_lambda::logging::init_tracing;
use signup_pipeline_lambda::runtime::contract::{ErrorKind, StageEnvelope, StageFailure};
use tracing::error;

/// One deployed stage. `SIGNUP_STAGE` selects the unit of work; the answer
/// is always a stage envelope.
async fn handle_request(event: LambdaEvent<Value>) -> Result<Value, Error> {
    let config = RuntimeConfig::from_env().map_err(|error| Error::from(error.to_string()))?;
    let role = config
        .require_stage_role()
        .map_err(|error| Error::from(error.to_string()))?;
    let payload = event.payload;

    match role {
        StageRole::Validation => to_value(handle_validate_payload(payload)),
        StageRole::Creation | StageRole::Compensation => {
            let Some(store) = account_store(&config).await else {
                return unavailable(ErrorKind::StoreUnavailable, "account store is not configured");
            };
            if role == StageRole::Creation {
                let Ok(secret) = config.require_idempotency_secret() else {
                    return unavailable(
                        ErrorKind::StoreUnavailable,
                        "idempotency secret is not configured",
                    );
                };
                to_value(handle_create_payload(
                    payload,
                    &store,
                    &Utc::now().to_rfc3339(),
                    secret,
                ))
            } else {
                to_value(handle_deactivate_payload(payload, &store))
            }
        }
        StageRole::Notification => {
            let (Ok(queue_url), Ok(secret)) = (
                config.require_confirmation_queue_url(),
                config.require_idempotency_secret(),
            ) else {
                return unavailable(
                    ErrorKind::DispatchUnavailable,
                    "confirmation queue or idempotency secret is not configured",
                );
            };
            let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            let dispatcher = SqsConfirmationDispatcher {
                queue_url: queue_url.to_string(),
                timeout: config.notify_timeout,
                sqs_client: aws_sdk_sqs::Client::new(&aws_config),
            };
            to_value(handle_notify_payload(payload, &dispatcher, secret))
        }
        StageRole::Failure => {
            let now = Utc::now();
            let sink = FailureSinkConfig {
                prefix: config.failures_prefix.clone(),
                run_date: now.format("%Y-%m-%d").to_string(),
                event_time: now.to_rfc3339(),
            };
            let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            // Without a bucket every write fails and the record degrades to
            // the local log.
            let store = S3ObjectStore {
                bucket: config.accounts_bucket.clone().unwrap_or_default(),
                s3_client: aws_sdk_s3::Client::new(&aws_config),
            };
            to_value(handle_failure_payload(payload, &store, &sink))
        }
    }
}

async fn account_store(config: &RuntimeConfig) -> Option<S3AccountStore> {
    let bucket = config.require_accounts_bucket().ok()?.to_string();
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    Some(S3AccountStore {
        bucket,
        prefix: config.accounts_prefix.clone(),
        s3_client: aws_sdk_s3::Client::new(&aws_config),
    })
}

fn unavailable(kind: ErrorKind, message: &str) -> Result<Value, Error> {
    error!(
        component = "stage_lambda",
        event = "misconfiguration",
        error_kind = kind.as_str(),
        message,
    );
    to_value(StageEnvelope::<Value>::Failure(StageFailure::new(kind, message)))
}

fn to_value<T: Serialize>(envelope: StageEnvelope<T>) -> Result<Value, Error> {
    serde_json::to_value(envelope)
        .map_err(|error| Error::from(format!("failed to serialize stage envelope: {error}")))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();
    lambda_runtime::run(service_fn(handle_request)).await
}
