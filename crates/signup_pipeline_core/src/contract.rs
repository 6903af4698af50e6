use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::idempotency::IdempotencyKey;

pub const PIPELINE_SCHEMA_VERSION: &str = "v1";
pub const ACCOUNT_CREATED_MESSAGE: &str = "Account created";
pub const CONFIRMATION_SENT_MESSAGE: &str = "Verification email sent";
pub const FAILURE_RECORDED_MESSAGE: &str = "Failure recorded";
pub const FAILURE_RECORDED_LOCALLY_MESSAGE: &str = "Failure recorded locally";

/// Raw signup input as produced by the caller.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    /// Caller-supplied deduplication key. Derived from the request when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl SignupRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

impl fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("idempotency_key", &self.idempotency_key)
            .finish()
    }
}

/// A [`SignupRequest`] that passed validation.
///
/// Only [`crate::validation::validate`] can build one, so holding a value of
/// this type is proof that the validation rules were applied.
#[derive(Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedRequest {
    email: String,
    password: String,
    idempotency_key: IdempotencyKey,
}

impl ValidatedRequest {
    pub(crate) fn new(email: String, password: String, idempotency_key: IdempotencyKey) -> Self {
        Self {
            email,
            password,
            idempotency_key,
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn idempotency_key(&self) -> &IdempotencyKey {
        &self.idempotency_key
    }
}

impl fmt::Debug for ValidatedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("idempotency_key", &self.idempotency_key)
            .finish()
    }
}

/// A registered account identity.
///
/// In-process code builds accounts only from a [`ValidatedRequest`]. The
/// `Deserialize` impl exists for the stage invocation boundary, where the
/// payload was produced by the orchestrator from such an account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    account_id: String,
    email: String,
    idempotency_key: IdempotencyKey,
}

impl Account {
    /// Issues a fresh account with a random 128-bit identifier.
    pub fn issue(request: &ValidatedRequest) -> Self {
        Self::restore(request, Uuid::new_v4().to_string())
    }

    /// Rebuilds an account that an earlier invocation already issued for the
    /// same request.
    pub fn restore(request: &ValidatedRequest, account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            email: request.email.clone(),
            idempotency_key: request.idempotency_key.clone(),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn idempotency_key(&self) -> &IdempotencyKey {
        &self.idempotency_key
    }
}

/// Proof that a confirmation was handed to the outbound channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationReceipt {
    message: String,
}

impl NotificationReceipt {
    pub fn dispatched(account: &Account) -> Self {
        Self::for_account(account, CONFIRMATION_SENT_MESSAGE)
    }

    pub fn for_account(_account: &Account, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Terminal failure of a pipeline run, handed to the failure stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub error_kind: ErrorKind,
    pub cause: String,
}

impl FailureRecord {
    pub fn from_stage_failure(stage: StageName, failure: &StageFailure) -> Self {
        Self {
            error_kind: failure.kind,
            cause: format!("{}: {}", stage.as_str(), failure.message),
        }
    }
}

/// Acknowledgement returned by the failure stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureAck {
    pub message: String,
    #[serde(default)]
    pub degraded: bool,
}

impl FailureAck {
    pub fn recorded() -> Self {
        Self {
            message: FAILURE_RECORDED_MESSAGE.to_string(),
            degraded: false,
        }
    }

    pub fn recorded_locally() -> Self {
        Self {
            message: FAILURE_RECORDED_LOCALLY_MESSAGE.to_string(),
            degraded: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Validation,
    Creation,
    Notification,
    Failure,
}

impl StageName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Creation => "creation",
            Self::Notification => "notification",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingField,
    InvalidFormat,
    WeakPassword,
    MalformedPayload,
    DuplicateAccount,
    StoreUnavailable,
    DispatchUnavailable,
    StageUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caused by caller data; surfaced verbatim and never retried.
    Input,
    /// Transient infrastructure trouble; the whole run may be retried.
    Resource,
    /// Terminal for this request.
    Conflict,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingField => "MissingField",
            Self::InvalidFormat => "InvalidFormat",
            Self::WeakPassword => "WeakPassword",
            Self::MalformedPayload => "MalformedPayload",
            Self::DuplicateAccount => "DuplicateAccount",
            Self::StoreUnavailable => "StoreUnavailable",
            Self::DispatchUnavailable => "DispatchUnavailable",
            Self::StageUnavailable => "StageUnavailable",
        }
    }

    pub fn class(self) -> ErrorClass {
        match self {
            Self::MissingField | Self::InvalidFormat | Self::WeakPassword | Self::MalformedPayload => {
                ErrorClass::Input
            }
            Self::StoreUnavailable | Self::DispatchUnavailable | Self::StageUnavailable => {
                ErrorClass::Resource
            }
            Self::DuplicateAccount => ErrorClass::Conflict,
        }
    }

    pub fn is_retryable(self) -> bool {
        self.class() == ErrorClass::Resource
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure returned by any stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(rename_all = "camelCase")]
#[error("{kind}: {message}")]
pub struct StageFailure {
    #[serde(rename = "errorKind")]
    pub kind: ErrorKind,
    pub message: String,
}

impl StageFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Wire shape of every stage response at the invocation boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageEnvelope<T> {
    Success(T),
    Failure(StageFailure),
}

impl<T> StageEnvelope<T> {
    pub fn into_result(self) -> Result<T, StageFailure> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(failure) => Err(failure),
        }
    }
}

impl<T> From<Result<T, StageFailure>> for StageEnvelope<T> {
    fn from(result: Result<T, StageFailure>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(failure) => Self::Failure(failure),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreationResponse {
    pub message: String,
    pub email: String,
    pub account_id: String,
}

impl From<&Account> for CreationResponse {
    fn from(account: &Account) -> Self {
        Self {
            message: ACCOUNT_CREATED_MESSAGE.to_string(),
            email: account.email().to_string(),
            account_id: account.account_id().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}
