use serde::{Deserialize, Serialize};

use crate::runtime::contract::Account;
use crate::runtime::idempotency::IdempotencySecret;

pub const CONFIRMATION_SUBJECT: &str = "Confirm your account";

/// Confirmation artifact handed to the outbound channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationMessage {
    pub to: String,
    pub account_id: String,
    pub subject: String,
    pub body: String,
    /// Stable per logical request; channels use it to drop redeliveries.
    pub deduplication_id: String,
}

impl ConfirmationMessage {
    pub fn for_account(account: &Account, secret: &IdempotencySecret) -> Self {
        Self {
            to: account.email().to_string(),
            account_id: account.account_id().to_string(),
            subject: CONFIRMATION_SUBJECT.to_string(),
            body: format!(
                "Welcome! Please confirm the account registered for {}.",
                account.email()
            ),
            deduplication_id: account.idempotency_key().seal(secret),
        }
    }
}

/// Outbound channel. Success means the channel accepted the message, not
/// that it reached the mailbox.
pub trait ConfirmationDispatcher {
    fn dispatch(&self, message: &ConfirmationMessage) -> Result<(), String>;
}
