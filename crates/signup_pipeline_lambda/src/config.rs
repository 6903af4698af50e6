//! Environment-driven runtime configuration shared by the Lambda binaries.

use std::time::Duration;

use thiserror::Error;

use crate::runtime::idempotency::IdempotencySecret;
use crate::runtime::orchestrator::{OrchestratorConfig, RetryPolicy};

pub const ACCOUNTS_BUCKET_ENV: &str = "SIGNUP_ACCOUNTS_BUCKET";
pub const ACCOUNTS_PREFIX_ENV: &str = "SIGNUP_ACCOUNTS_PREFIX";
pub const FAILURES_PREFIX_ENV: &str = "SIGNUP_FAILURES_PREFIX";
pub const CONFIRMATION_QUEUE_URL_ENV: &str = "CONFIRMATION_QUEUE_URL";
pub const NOTIFY_TIMEOUT_MS_ENV: &str = "SIGNUP_NOTIFY_TIMEOUT_MS";
pub const MAX_ATTEMPTS_ENV: &str = "SIGNUP_MAX_ATTEMPTS";
pub const RETRY_BACKOFF_MS_ENV: &str = "SIGNUP_RETRY_BACKOFF_MS";
pub const COMPENSATE_ENV: &str = "SIGNUP_COMPENSATE_ON_NOTIFY_FAILURE";
pub const STAGE_ENV: &str = "SIGNUP_STAGE";
pub const VALIDATE_FUNCTION_ENV: &str = "SIGNUP_VALIDATE_FUNCTION";
pub const CREATE_FUNCTION_ENV: &str = "SIGNUP_CREATE_FUNCTION";
pub const NOTIFY_FUNCTION_ENV: &str = "SIGNUP_NOTIFY_FUNCTION";
pub const FAIL_FUNCTION_ENV: &str = "SIGNUP_FAIL_FUNCTION";
pub const COMPENSATE_FUNCTION_ENV: &str = "SIGNUP_COMPENSATE_FUNCTION";
pub const IDEMPOTENCY_SECRET_ENV: &str = "SIGNUP_IDEMPOTENCY_SECRET";

pub const DEFAULT_ACCOUNTS_PREFIX: &str = "signup/accounts";
pub const DEFAULT_FAILURES_PREFIX: &str = "signup/failures";
pub const DEFAULT_NOTIFY_TIMEOUT_MS: u64 = 3_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be configured")]
    Missing(&'static str),
    #[error("{key} has invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which unit of work a `stage_lambda` deployment performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRole {
    Validation,
    Creation,
    Notification,
    Failure,
    Compensation,
}

impl StageRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "validation" | "validate" => Some(Self::Validation),
            "creation" | "create" => Some(Self::Creation),
            "notification" | "notify" => Some(Self::Notification),
            "failure" | "fail" => Some(Self::Failure),
            "compensation" | "compensate" => Some(Self::Compensation),
            _ => None,
        }
    }
}

/// Function names of separately deployed stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFunctions {
    pub validate: String,
    pub create: String,
    pub notify: String,
    pub fail: String,
    pub compensate: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub accounts_bucket: Option<String>,
    pub accounts_prefix: String,
    pub failures_prefix: String,
    pub confirmation_queue_url: Option<String>,
    pub notify_timeout: Duration,
    pub orchestrator: OrchestratorConfig,
    pub stage_role: Option<StageRole>,
    pub stage_functions: Option<StageFunctions>,
    pub idempotency_secret: Option<IdempotencySecret>,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let stage_role = match read(STAGE_ENV) {
            Some(value) => Some(StageRole::parse(&value).ok_or_else(|| ConfigError::Invalid {
                key: STAGE_ENV,
                value: value.clone(),
                reason: "expected validation, creation, notification, failure or compensation"
                    .to_string(),
            })?),
            None => None,
        };

        let retry_defaults = RetryPolicy::default();
        let max_attempts = parse_number(MAX_ATTEMPTS_ENV, read(MAX_ATTEMPTS_ENV))?
            .unwrap_or(u64::from(retry_defaults.max_attempts));
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: MAX_ATTEMPTS_ENV,
                value: max_attempts.to_string(),
                reason: "must be a positive integer".to_string(),
            });
        }
        let max_attempts = u32::try_from(max_attempts).map_err(|_| ConfigError::Invalid {
            key: MAX_ATTEMPTS_ENV,
            value: max_attempts.to_string(),
            reason: "out of range".to_string(),
        })?;

        let backoff = parse_number(RETRY_BACKOFF_MS_ENV, read(RETRY_BACKOFF_MS_ENV))?
            .map(Duration::from_millis)
            .unwrap_or(retry_defaults.backoff);
        let notify_timeout = Duration::from_millis(
            parse_number(NOTIFY_TIMEOUT_MS_ENV, read(NOTIFY_TIMEOUT_MS_ENV))?
                .unwrap_or(DEFAULT_NOTIFY_TIMEOUT_MS),
        );

        let compensate_on_notify_failure = match read(COMPENSATE_ENV) {
            None => false,
            Some(value) => parse_flag(&value).ok_or_else(|| ConfigError::Invalid {
                key: COMPENSATE_ENV,
                value,
                reason: "expected true/false".to_string(),
            })?,
        };

        let stage_functions = match (
            read(VALIDATE_FUNCTION_ENV),
            read(CREATE_FUNCTION_ENV),
            read(NOTIFY_FUNCTION_ENV),
            read(FAIL_FUNCTION_ENV),
        ) {
            (Some(validate), Some(create), Some(notify), Some(fail)) => Some(StageFunctions {
                validate,
                create,
                notify,
                fail,
                compensate: read(COMPENSATE_FUNCTION_ENV),
            }),
            _ => None,
        };

        let idempotency_secret = read(IDEMPOTENCY_SECRET_ENV)
            .map(|value| {
                IdempotencySecret::new(value.as_bytes()).map_err(|error| ConfigError::Invalid {
                    key: IDEMPOTENCY_SECRET_ENV,
                    value: "<redacted>".to_string(),
                    reason: error.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            accounts_bucket: read(ACCOUNTS_BUCKET_ENV),
            accounts_prefix: read(ACCOUNTS_PREFIX_ENV)
                .unwrap_or_else(|| DEFAULT_ACCOUNTS_PREFIX.to_string()),
            failures_prefix: read(FAILURES_PREFIX_ENV)
                .unwrap_or_else(|| DEFAULT_FAILURES_PREFIX.to_string()),
            confirmation_queue_url: read(CONFIRMATION_QUEUE_URL_ENV),
            notify_timeout,
            orchestrator: OrchestratorConfig {
                retry: RetryPolicy {
                    max_attempts,
                    backoff,
                },
                compensate_on_notify_failure,
            },
            stage_role,
            stage_functions,
            idempotency_secret,
        })
    }

    pub fn require_accounts_bucket(&self) -> Result<&str, ConfigError> {
        self.accounts_bucket
            .as_deref()
            .ok_or(ConfigError::Missing(ACCOUNTS_BUCKET_ENV))
    }

    pub fn require_confirmation_queue_url(&self) -> Result<&str, ConfigError> {
        self.confirmation_queue_url
            .as_deref()
            .ok_or(ConfigError::Missing(CONFIRMATION_QUEUE_URL_ENV))
    }

    /// Needed wherever idempotency keys are persisted or dispatched.
    pub fn require_idempotency_secret(&self) -> Result<&IdempotencySecret, ConfigError> {
        self.idempotency_secret
            .as_ref()
            .ok_or(ConfigError::Missing(IDEMPOTENCY_SECRET_ENV))
    }

    pub fn require_stage_role(&self) -> Result<StageRole, ConfigError> {
        self.stage_role.ok_or(ConfigError::Missing(STAGE_ENV))
    }
}

fn parse_number(key: &'static str, value: Option<String>) -> Result<Option<u64>, ConfigError> {
    value
        .map(|raw| {
            raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: error.to_string(),
            })
        })
        .transpose()
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<RuntimeConfig, ConfigError> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        RuntimeConfig::from_lookup(|key| values.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = config_from(&[]).expect("empty environment is valid");

        assert_eq!(config.accounts_prefix, DEFAULT_ACCOUNTS_PREFIX);
        assert_eq!(config.failures_prefix, DEFAULT_FAILURES_PREFIX);
        assert_eq!(config.notify_timeout, Duration::from_millis(3_000));
        assert_eq!(config.orchestrator, OrchestratorConfig::default());
        assert_eq!(config.stage_functions, None);
        assert_eq!(
            config.require_accounts_bucket(),
            Err(ConfigError::Missing(ACCOUNTS_BUCKET_ENV))
        );
    }

    #[test]
    fn reads_retry_and_compensation_settings() {
        let config = config_from(&[
            (MAX_ATTEMPTS_ENV, "3"),
            (RETRY_BACKOFF_MS_ENV, "50"),
            (COMPENSATE_ENV, "true"),
            (STAGE_ENV, "notify"),
        ])
        .expect("config should parse");

        assert_eq!(config.orchestrator.retry.max_attempts, 3);
        assert_eq!(config.orchestrator.retry.backoff, Duration::from_millis(50));
        assert!(config.orchestrator.compensate_on_notify_failure);
        assert_eq!(config.stage_role, Some(StageRole::Notification));
    }

    #[test]
    fn remote_mode_requires_all_four_stage_functions() {
        let partial = config_from(&[
            (VALIDATE_FUNCTION_ENV, "validate-fn"),
            (CREATE_FUNCTION_ENV, "create-fn"),
        ])
        .expect("config should parse");
        assert_eq!(partial.stage_functions, None);

        let full = config_from(&[
            (VALIDATE_FUNCTION_ENV, "validate-fn"),
            (CREATE_FUNCTION_ENV, "create-fn"),
            (NOTIFY_FUNCTION_ENV, "notify-fn"),
            (FAIL_FUNCTION_ENV, "fail-fn"),
        ])
        .expect("config should parse");
        let functions = full.stage_functions.expect("remote mode should be enabled");
        assert_eq!(functions.notify, "notify-fn");
        assert_eq!(functions.compensate, None);
    }

    #[test]
    fn idempotency_secret_is_required_and_never_printed() {
        let missing = config_from(&[]).expect("empty environment is valid");
        assert!(matches!(
            missing.require_idempotency_secret(),
            Err(ConfigError::Missing(IDEMPOTENCY_SECRET_ENV))
        ));

        let config = config_from(&[(IDEMPOTENCY_SECRET_ENV, "s3cr3t-value")])
            .expect("config should parse");
        assert!(config.require_idempotency_secret().is_ok());
        assert!(!format!("{config:?}").contains("s3cr3t-value"));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            config_from(&[(MAX_ATTEMPTS_ENV, "0")]),
            Err(ConfigError::Invalid { key: MAX_ATTEMPTS_ENV, .. })
        ));
        assert!(matches!(
            config_from(&[(NOTIFY_TIMEOUT_MS_ENV, "soon")]),
            Err(ConfigError::Invalid { key: NOTIFY_TIMEOUT_MS_ENV, .. })
        ));
        assert!(matches!(
            config_from(&[(STAGE_ENV, "deploy")]),
            Err(ConfigError::Invalid { key: STAGE_ENV, .. })
        ));
    }
}
