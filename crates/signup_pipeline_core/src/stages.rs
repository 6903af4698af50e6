use crate::contract::{
    Account, FailureAck, FailureRecord, NotificationReceipt, SignupRequest, StageFailure,
    ValidatedRequest,
};

/// The capability set the orchestrator drives.
///
/// Implementations must not keep state across calls: the external invoker
/// may run any stage several times for the same logical request. How a
/// stage is physically reached (in-process call, Lambda invoke, queue) is
/// the implementor's business.
pub trait SignupStages {
    fn validate(&self, request: &SignupRequest) -> Result<ValidatedRequest, StageFailure>;

    fn create_account(&self, request: &ValidatedRequest) -> Result<Account, StageFailure>;

    fn send_confirmation(&self, account: &Account) -> Result<NotificationReceipt, StageFailure>;

    /// Terminal stage on every error path. Infallible by signature.
    fn record_failure(&self, record: &FailureRecord) -> FailureAck;

    /// Undo for a created account whose confirmation could not be sent.
    fn compensate(&self, _account: &Account) -> Result<(), StageFailure> {
        Ok(())
    }
}

impl<S: SignupStages + ?Sized> SignupStages for &S {
    fn validate(&self, request: &SignupRequest) -> Result<ValidatedRequest, StageFailure> {
        (**self).validate(request)
    }

    fn create_account(&self, request: &ValidatedRequest) -> Result<Account, StageFailure> {
        (**self).create_account(request)
    }

    fn send_confirmation(&self, account: &Account) -> Result<NotificationReceipt, StageFailure> {
        (**self).send_confirmation(account)
    }

    fn record_failure(&self, record: &FailureRecord) -> FailureAck {
        (**self).record_failure(record)
    }

    fn compensate(&self, account: &Account) -> Result<(), StageFailure> {
        (**self).compensate(account)
    }
}
