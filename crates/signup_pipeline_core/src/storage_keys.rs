use crate::idempotency::email_fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Accounts,
    Failures,
}

impl DatasetKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::Failures => "failures",
        }
    }
}

pub fn dataset_prefix(base_prefix: &str, dataset: DatasetKind) -> String {
    let trimmed = base_prefix.trim_matches('/');
    if trimmed.is_empty() {
        format!("dataset={}", dataset.as_str())
    } else {
        format!("{trimmed}/dataset={}", dataset.as_str())
    }
}

/// One object per registered email; the raw address never appears in the key.
pub fn account_object_key(base_prefix: &str, email: &str) -> String {
    format!(
        "{}/email_hash={}/account.json",
        dataset_prefix(base_prefix, DatasetKind::Accounts),
        email_fingerprint(email),
    )
}

pub fn failure_object_key(base_prefix: &str, run_date: &str, failure_id: &str) -> String {
    format!(
        "{}/run_date={run_date}/failure_id={failure_id}/record.json",
        dataset_prefix(base_prefix, DatasetKind::Failures),
    )
}
