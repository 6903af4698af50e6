use serde_json::Value;
use tracing::{info, warn};

use crate::adapters::account_store::{AccountRecord, AccountStore, InsertOutcome};
use crate::handlers::validate::decode_signup_request;
use crate::runtime::contract::{
    Account, CreationResponse, ErrorKind, StageEnvelope, StageFailure, ValidatedRequest,
};
use crate::runtime::idempotency::IdempotencySecret;
use crate::runtime::validation::validate;

/// Issues an account for `request` with a single conditional write.
///
/// A stored record carrying the same idempotency key is a replay of this
/// request and yields the stored account instead of a second one. Keys are
/// compared in their sealed form.
pub fn create_account(
    request: &ValidatedRequest,
    store: &impl AccountStore,
    created_at: &str,
    secret: &IdempotencySecret,
) -> Result<Account, StageFailure> {
    let candidate = Account::issue(request);
    let record = AccountRecord::new(&candidate, created_at, secret);

    match store.insert_if_absent(&record) {
        Ok(InsertOutcome::Inserted) => {
            info!(
                component = "creation_stage",
                event = "account_created",
                account_id = candidate.account_id(),
            );
            Ok(candidate)
        }
        Ok(InsertOutcome::Existing(existing))
            if existing.idempotency_key == record.idempotency_key =>
        {
            info!(
                component = "creation_stage",
                event = "account_replayed",
                account_id = %existing.account_id,
            );
            Ok(Account::restore(request, existing.account_id))
        }
        Ok(InsertOutcome::Existing(_)) => Err(StageFailure::new(
            ErrorKind::DuplicateAccount,
            "email is already registered",
        )),
        Err(error) => {
            warn!(
                component = "creation_stage",
                event = "store_unavailable",
                error = %error,
            );
            Err(StageFailure::new(
                ErrorKind::StoreUnavailable,
                format!("account store unavailable: {error}"),
            ))
        }
    }
}

/// Compensating action: removes the account record if it still belongs to
/// `account`.
pub fn deactivate_account(
    account: &Account,
    store: &impl AccountStore,
) -> Result<(), StageFailure> {
    let removed = store
        .remove(account.email(), account.account_id())
        .map_err(|error| {
            StageFailure::new(
                ErrorKind::StoreUnavailable,
                format!("account store unavailable: {error}"),
            )
        })?;

    info!(
        component = "creation_stage",
        event = "account_deactivated",
        account_id = account.account_id(),
        removed,
    );
    Ok(())
}

/// Creation stage entry point. The payload is re-validated at the boundary
/// so an account is never built from unchecked input.
pub fn handle_create_payload(
    payload: Value,
    store: &impl AccountStore,
    created_at: &str,
    secret: &IdempotencySecret,
) -> StageEnvelope<CreationResponse> {
    decode_signup_request(payload)
        .and_then(|request| validate(&request))
        .and_then(|validated| create_account(&validated, store, created_at, secret))
        .map(|account| CreationResponse::from(&account))
        .into()
}

pub fn handle_deactivate_payload(
    payload: Value,
    store: &impl AccountStore,
) -> StageEnvelope<serde_json::Value> {
    let account: Account = match serde_json::from_value(payload) {
        Ok(value) => value,
        Err(error) => {
            return StageEnvelope::Failure(StageFailure::new(
                ErrorKind::MalformedPayload,
                format!("malformed account payload: {error}"),
            ));
        }
    };

    deactivate_account(&account, store)
        .map(|()| serde_json::json!({ "accountId": account.account_id() }))
        .into()
}
