use serde_json::Value;
use tracing::{info, warn};

use crate::adapters::dispatch::{ConfirmationDispatcher, ConfirmationMessage};
use crate::runtime::contract::{
    Account, ErrorKind, MessageResponse, NotificationReceipt, StageEnvelope, StageFailure,
};
use crate::runtime::idempotency::IdempotencySecret;

pub fn send_confirmation(
    account: &Account,
    dispatcher: &impl ConfirmationDispatcher,
    secret: &IdempotencySecret,
) -> Result<NotificationReceipt, StageFailure> {
    let message = ConfirmationMessage::for_account(account, secret);

    match dispatcher.dispatch(&message) {
        Ok(()) => {
            info!(
                component = "notification_stage",
                event = "confirmation_dispatched",
                account_id = account.account_id(),
                deduplication_id = %message.deduplication_id,
            );
            Ok(NotificationReceipt::dispatched(account))
        }
        Err(error) => {
            warn!(
                component = "notification_stage",
                event = "dispatch_unavailable",
                account_id = account.account_id(),
                error = %error,
            );
            Err(StageFailure::new(
                ErrorKind::DispatchUnavailable,
                format!("confirmation channel unavailable: {error}"),
            ))
        }
    }
}

pub fn handle_notify_payload(
    payload: Value,
    dispatcher: &impl ConfirmationDispatcher,
    secret: &IdempotencySecret,
) -> StageEnvelope<MessageResponse> {
    let account: Account = match serde_json::from_value(payload) {
        Ok(value) => value,
        Err(error) => {
            return StageEnvelope::Failure(StageFailure::new(
                ErrorKind::MalformedPayload,
                format!("malformed account payload: {error}"),
            ));
        }
    };

    send_confirmation(&account, dispatcher, secret)
        .map(|receipt| MessageResponse {
            message: receipt.message().to_string(),
        })
        .into()
}
