//! AWS SDK implementations of the adapter traits.
//!
//! The pipeline core is synchronous, so every SDK call is driven to
//! completion on the current Tokio runtime with `block_in_place`. Binaries
//! must therefore run on the multi-threaded runtime.

use std::future::Future;
use std::time::Duration;

use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use aws_sdk_s3::primitives::ByteStream;

use crate::adapters::account_store::{AccountRecord, AccountStore, InsertOutcome};
use crate::adapters::dispatch::{ConfirmationDispatcher, ConfirmationMessage};
use crate::adapters::invoke::StageInvoker;
use crate::adapters::object_store::ObjectStore;
use crate::runtime::storage_keys::account_object_key;

const PRECONDITION_FAILED: u16 = 412;
const NOT_FOUND: u16 = 404;

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

pub struct S3ObjectStore {
    pub bucket: String,
    pub s3_client: aws_sdk_s3::Client,
}

impl ObjectStore for S3ObjectStore {
    fn write_object(&self, key: &str, body: &[u8]) -> Result<(), String> {
        let bucket = self.bucket.clone();
        let object_key = key.to_string();
        let body_bytes = body.to_vec();
        let client = self.s3_client.clone();

        block_on(async move {
            client
                .put_object()
                .bucket(bucket)
                .key(object_key)
                .content_type("application/json")
                .body(ByteStream::from(body_bytes))
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("failed to write object to s3: {error}"))
        })
    }
}

/// One JSON object per email, written with `If-None-Match: *` so the first
/// writer wins.
pub struct S3AccountStore {
    pub bucket: String,
    pub prefix: String,
    pub s3_client: aws_sdk_s3::Client,
}

impl S3AccountStore {
    async fn read_record(&self, key: &str) -> Result<Option<AccountRecord>, String> {
        let response = self
            .s3_client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        let output = match response {
            Ok(output) => output,
            Err(error) => {
                if error.raw_response().map(|raw| raw.status().as_u16()) == Some(NOT_FOUND) {
                    return Ok(None);
                }
                return Err(format!("failed to read account record from s3: {error}"));
            }
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|error| format!("failed to read account record body: {error}"))?
            .into_bytes();

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|error| format!("stored account record is malformed: {error}"))
    }
}

impl AccountStore for S3AccountStore {
    fn insert_if_absent(&self, record: &AccountRecord) -> Result<InsertOutcome, String> {
        let key = account_object_key(&self.prefix, &record.email);
        let body = serde_json::to_vec(record)
            .map_err(|error| format!("failed to serialize account record: {error}"))?;

        block_on(async {
            let response = self
                .s3_client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .if_none_match("*")
                .content_type("application/json")
                .body(ByteStream::from(body))
                .send()
                .await;

            match response {
                Ok(_) => Ok(InsertOutcome::Inserted),
                Err(error)
                    if error.raw_response().map(|raw| raw.status().as_u16())
                        == Some(PRECONDITION_FAILED) =>
                {
                    match self.read_record(&key).await? {
                        Some(existing) => Ok(InsertOutcome::Existing(existing)),
                        None => Err("account record vanished after conflicting write".to_string()),
                    }
                }
                Err(error) => Err(format!("failed to write account record to s3: {error}")),
            }
        })
    }

    fn remove(&self, email: &str, account_id: &str) -> Result<bool, String> {
        let key = account_object_key(&self.prefix, email);

        block_on(async {
            match self.read_record(&key).await? {
                Some(existing) if existing.account_id == account_id => {}
                _ => return Ok(false),
            }

            self.s3_client
                .delete_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map(|_| true)
                .map_err(|error| format!("failed to delete account record from s3: {error}"))
        })
    }
}

pub struct SqsConfirmationDispatcher {
    pub queue_url: String,
    pub timeout: Duration,
    pub sqs_client: aws_sdk_sqs::Client,
}

impl SqsConfirmationDispatcher {
    fn is_fifo(&self) -> bool {
        self.queue_url.ends_with(".fifo")
    }
}

impl ConfirmationDispatcher for SqsConfirmationDispatcher {
    fn dispatch(&self, message: &ConfirmationMessage) -> Result<(), String> {
        let body = serde_json::to_string(message)
            .map_err(|error| format!("failed to serialize confirmation message: {error}"))?;
        let fifo = self.is_fifo();

        let send = self
            .sqs_client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .set_message_group_id(fifo.then(|| message.account_id.clone()))
            .set_message_deduplication_id(fifo.then(|| message.deduplication_id.clone()))
            .send();

        block_on(async move {
            match tokio::time::timeout(self.timeout, send).await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(error)) => Err(format!("failed to enqueue confirmation message: {error}")),
                Err(_) => Err(format!(
                    "confirmation dispatch exceeded {} ms budget",
                    self.timeout.as_millis()
                )),
            }
        })
    }
}

/// Synchronous `RequestResponse` invocation; the client carries the
/// operation timeout.
pub struct LambdaStageInvoker {
    pub lambda_client: aws_sdk_lambda::Client,
}

impl StageInvoker for LambdaStageInvoker {
    fn invoke_stage(&self, function_name: &str, payload: &[u8]) -> Result<Vec<u8>, String> {
        let client = self.lambda_client.clone();
        let function_name = function_name.to_string();
        let request_payload = payload.to_vec();

        block_on(async move {
            let output = client
                .invoke()
                .function_name(&function_name)
                .invocation_type(InvocationType::RequestResponse)
                .payload(Blob::new(request_payload))
                .send()
                .await
                .map_err(|error| format!("failed to invoke stage function {function_name}: {error}"))?;

            if let Some(function_error) = output.function_error() {
                return Err(format!(
                    "stage function {function_name} raised {function_error}"
                ));
            }

            Ok(output
                .payload()
                .map(|blob| blob.as_ref().to_vec())
                .unwrap_or_default())
        })
    }
}
