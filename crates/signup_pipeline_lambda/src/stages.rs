//! Concrete capability sets for the orchestrator: stages composed
//! in-process over adapters, or reached through a [`StageInvoker`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use crate::adapters::account_store::AccountStore;
use crate::adapters::dispatch::ConfirmationDispatcher;
use crate::adapters::invoke::StageInvoker;
use crate::adapters::object_store::ObjectStore;
use crate::config::StageFunctions;
use crate::handlers::create_account::{create_account, deactivate_account};
use crate::handlers::notify_failure::{record_failure, record_locally, FailureSinkConfig};
use crate::handlers::send_confirmation::send_confirmation;
use crate::runtime::contract::{
    Account, CreationResponse, ErrorKind, FailureAck, FailureRecord, MessageResponse,
    NotificationReceipt, SignupRequest, StageEnvelope, StageFailure, ValidatedRequest,
};
use crate::runtime::idempotency::IdempotencySecret;
use crate::runtime::stages::SignupStages;
use crate::runtime::validation::validate;

/// All four stages running inside the calling process.
pub struct LocalStages<A, D, O> {
    pub accounts: A,
    pub dispatcher: D,
    pub failure_store: O,
    pub failure_sink: FailureSinkConfig,
    pub created_at: String,
    pub idempotency_secret: IdempotencySecret,
}

impl<A, D, O> SignupStages for LocalStages<A, D, O>
where
    A: AccountStore,
    D: ConfirmationDispatcher,
    O: ObjectStore,
{
    fn validate(&self, request: &SignupRequest) -> Result<ValidatedRequest, StageFailure> {
        validate(request)
    }

    fn create_account(&self, request: &ValidatedRequest) -> Result<Account, StageFailure> {
        create_account(
            request,
            &self.accounts,
            &self.created_at,
            &self.idempotency_secret,
        )
    }

    fn send_confirmation(&self, account: &Account) -> Result<NotificationReceipt, StageFailure> {
        send_confirmation(account, &self.dispatcher, &self.idempotency_secret)
    }

    fn record_failure(&self, record: &FailureRecord) -> FailureAck {
        record_failure(record, &self.failure_store, &self.failure_sink)
    }

    fn compensate(&self, account: &Account) -> Result<(), StageFailure> {
        deactivate_account(account, &self.accounts)
    }
}

/// Stages deployed as separate functions behind an invocation boundary.
pub struct RemoteStages<I> {
    pub invoker: I,
    pub functions: StageFunctions,
}

impl<I: StageInvoker> RemoteStages<I> {
    fn call<T: DeserializeOwned>(
        &self,
        function_name: &str,
        payload: &impl Serialize,
    ) -> Result<T, StageFailure> {
        let body = serde_json::to_vec(payload).map_err(|error| {
            StageFailure::new(
                ErrorKind::MalformedPayload,
                format!("failed to encode stage payload: {error}"),
            )
        })?;

        let response = self
            .invoker
            .invoke_stage(function_name, &body)
            .map_err(|error| StageFailure::new(ErrorKind::StageUnavailable, error))?;

        serde_json::from_slice::<StageEnvelope<T>>(&response)
            .map_err(|error| {
                StageFailure::new(
                    ErrorKind::StageUnavailable,
                    format!("stage function {function_name} returned an unreadable response: {error}"),
                )
            })?
            .into_result()
    }
}

impl<I: StageInvoker> SignupStages for RemoteStages<I> {
    fn validate(&self, request: &SignupRequest) -> Result<ValidatedRequest, StageFailure> {
        self.call::<serde_json::Value>(&self.functions.validate, request)?;
        // The remote verdict is authoritative for failures; the typed proof
        // is minted locally from the same deterministic rules.
        validate(request)
    }

    fn create_account(&self, request: &ValidatedRequest) -> Result<Account, StageFailure> {
        let response: CreationResponse = self.call(&self.functions.create, request)?;
        Ok(Account::restore(request, response.account_id))
    }

    fn send_confirmation(&self, account: &Account) -> Result<NotificationReceipt, StageFailure> {
        let response: MessageResponse = self.call(&self.functions.notify, account)?;
        Ok(NotificationReceipt::for_account(account, response.message))
    }

    fn record_failure(&self, record: &FailureRecord) -> FailureAck {
        match self.call::<FailureAck>(&self.functions.fail, record) {
            Ok(ack) => ack,
            Err(failure) => {
                error!(
                    component = "remote_stages",
                    event = "failure_stage_unreachable",
                    error = %failure,
                );
                record_locally(record, &failure.message);
                FailureAck::recorded_locally()
            }
        }
    }

    fn compensate(&self, account: &Account) -> Result<(), StageFailure> {
        let Some(function_name) = self.functions.compensate.as_deref() else {
            return Err(StageFailure::new(
                ErrorKind::StageUnavailable,
                "no compensation function configured",
            ));
        };
        self.call::<serde_json::Value>(function_name, account)
            .map(|_| ())
    }
}
