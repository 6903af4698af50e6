use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use signup_pipeline_lambda::adapters::aws::{
    LambdaStageInvoker, S3AccountStore, S3ObjectStore, SqsConfirmationDispatcher,
};
use signup_pipeline_lambda::config::{ConfigError, RuntimeConfig};
use signup_pipeline_lambda::handlers::notify_failure::FailureSinkConfig;
use signup_pipeline_lambda::handlers::pipeline::{
    handle_signup_event, handle_sqs_batch, is_sqs_event, misconfiguration_response,
};
use signup_pipeline_lambda::logging::init_tracing;
use signup_pipeline_lambda::runtime::orchestrator::Orchestrator;
use signup_pipeline_lambda::runtime::stages::SignupStages;
use signup_pipeline_lambda::stages::{LocalStages, RemoteStages};
use tracing::error;

async fn handle_request(event: LambdaEvent<Value>) -> Result<Value, Error> {
    let config = match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(config_error) => return misconfigured(&event.payload, &config_error),
    };

    if let Some(functions) = config.stage_functions.clone() {
        let timeout = aws_config::timeout::TimeoutConfig::builder()
            .operation_timeout(config.notify_timeout)
            .build();
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .timeout_config(timeout)
            .load()
            .await;
        let stages = RemoteStages {
            invoker: LambdaStageInvoker {
                lambda_client: aws_sdk_lambda::Client::new(&aws_config),
            },
            functions,
        };
        return respond_blocking(event.payload, &Orchestrator::new(stages, config.orchestrator));
    }

    let (bucket, queue_url, idempotency_secret) = match (
        config.require_accounts_bucket(),
        config.require_confirmation_queue_url(),
        config.require_idempotency_secret(),
    ) {
        (Ok(bucket), Ok(queue_url), Ok(secret)) => {
            (bucket.to_string(), queue_url.to_string(), secret.clone())
        }
        (Err(config_error), _, _) | (_, Err(config_error), _) | (_, _, Err(config_error)) => {
            return misconfigured(&event.payload, &config_error)
        }
    };

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let s3_client = aws_sdk_s3::Client::new(&aws_config);
    let now = Utc::now();
    let stages = LocalStages {
        accounts: S3AccountStore {
            bucket: bucket.clone(),
            prefix: config.accounts_prefix.clone(),
            s3_client: s3_client.clone(),
        },
        dispatcher: SqsConfirmationDispatcher {
            queue_url,
            timeout: config.notify_timeout,
            sqs_client: aws_sdk_sqs::Client::new(&aws_config),
        },
        failure_store: S3ObjectStore { bucket, s3_client },
        failure_sink: FailureSinkConfig {
            prefix: config.failures_prefix.clone(),
            run_date: now.format("%Y-%m-%d").to_string(),
            event_time: now.to_rfc3339(),
        },
        created_at: now.to_rfc3339(),
        idempotency_secret,
    };

    respond_blocking(event.payload, &Orchestrator::new(stages, config.orchestrator))
}

/// Stage calls and retry backoff block the calling thread, so the run is
/// moved off the async worker.
fn respond_blocking<S: SignupStages>(
    payload: Value,
    orchestrator: &Orchestrator<S>,
) -> Result<Value, Error> {
    tokio::task::block_in_place(|| respond(payload, orchestrator))
}

fn respond<S: SignupStages>(payload: Value, orchestrator: &Orchestrator<S>) -> Result<Value, Error> {
    if is_sqs_event(&payload) {
        let response = handle_sqs_batch(&payload, orchestrator).map_err(Error::from)?;
        return serde_json::to_value(response)
            .map_err(|error| Error::from(format!("failed to serialize batch response: {error}")));
    }

    serde_json::to_value(handle_signup_event(payload, orchestrator))
        .map_err(|error| Error::from(format!("failed to serialize api response: {error}")))
}

/// API callers get a 500 body; queue deliveries fail the invocation so the
/// messages stay on the queue.
fn misconfigured(payload: &Value, config_error: &ConfigError) -> Result<Value, Error> {
    error!(
        component = "signup_runtime",
        event = "misconfiguration",
        error = %config_error,
    );

    if is_sqs_event(payload) {
        return Err(Error::from(config_error.to_string()));
    }

    serde_json::to_value(misconfiguration_response(&config_error.to_string()))
        .map_err(|error| Error::from(format!("failed to serialize api response: {error}")))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();
    lambda_runtime::run(service_fn(handle_request)).await
}
