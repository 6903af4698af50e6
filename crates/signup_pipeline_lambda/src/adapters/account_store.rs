use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::runtime::contract::Account;
use crate::runtime::idempotency::{normalize_email, IdempotencySecret};

pub const ACCOUNT_RECORD_SCHEMA_VERSION: &str = "v1";

/// Durable shape of a registered account. Credentials are not persisted here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub account_id: String,
    pub email: String,
    /// Sealed form of the request's idempotency key.
    pub idempotency_key: String,
    pub created_at: String,
    pub record_schema: String,
}

impl AccountRecord {
    pub fn new(
        account: &Account,
        created_at: impl Into<String>,
        secret: &IdempotencySecret,
    ) -> Self {
        Self {
            account_id: account.account_id().to_string(),
            email: account.email().to_string(),
            idempotency_key: account.idempotency_key().seal(secret),
            created_at: created_at.into(),
            record_schema: ACCOUNT_RECORD_SCHEMA_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The email was already registered; carries the stored record.
    Existing(AccountRecord),
}

/// Single-write account storage. `insert_if_absent` must be atomic per email.
pub trait AccountStore {
    fn insert_if_absent(&self, record: &AccountRecord) -> Result<InsertOutcome, String>;

    /// Removes the record for `email` only if it still belongs to
    /// `account_id`. Returns whether anything was removed.
    fn remove(&self, email: &str, account_id: &str) -> Result<bool, String>;
}

/// Process-local store for local runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    records: Mutex<HashMap<String, AccountRecord>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, email: &str) -> Option<AccountRecord> {
        self.records
            .lock()
            .ok()
            .and_then(|records| records.get(&normalize_email(email)).cloned())
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AccountStore for InMemoryAccountStore {
    fn insert_if_absent(&self, record: &AccountRecord) -> Result<InsertOutcome, String> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| "account store lock poisoned".to_string())?;

        let key = normalize_email(&record.email);
        if let Some(existing) = records.get(&key) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }

        records.insert(key, record.clone());
        Ok(InsertOutcome::Inserted)
    }

    fn remove(&self, email: &str, account_id: &str) -> Result<bool, String> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| "account store lock poisoned".to_string())?;

        let key = normalize_email(email);
        match records.get(&key) {
            Some(existing) if existing.account_id == account_id => {
                records.remove(&key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(account_id: &str, email: &str) -> AccountRecord {
        AccountRecord {
            account_id: account_id.to_string(),
            email: email.to_string(),
            idempotency_key: "key".to_string(),
            created_at: "2026-02-14T00:00:00Z".to_string(),
            record_schema: ACCOUNT_RECORD_SCHEMA_VERSION.to_string(),
        }
    }

    #[test]
    fn second_insert_for_same_email_returns_existing_record() {
        let store = InMemoryAccountStore::new();
        let first = record("acc-1", "a@b.com");

        assert_eq!(store.insert_if_absent(&first), Ok(InsertOutcome::Inserted));
        assert_eq!(
            store.insert_if_absent(&record("acc-2", "A@B.com")),
            Ok(InsertOutcome::Existing(first))
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_ignores_records_owned_by_another_account() {
        let store = InMemoryAccountStore::new();
        store
            .insert_if_absent(&record("acc-1", "a@b.com"))
            .expect("insert should succeed");

        assert_eq!(store.remove("a@b.com", "acc-2"), Ok(false));
        assert_eq!(store.remove("a@b.com", "acc-1"), Ok(true));
        assert!(store.is_empty());
    }
}
