use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::contract::{
    Account, ErrorKind, FailureAck, FailureRecord, NotificationReceipt, SignupRequest,
    StageFailure, StageName, ValidatedRequest,
};
use crate::stages::SignupStages;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Where a pipeline run currently stands, carrying the value the next stage
/// consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Received(SignupRequest),
    Validating(SignupRequest),
    Creating(ValidatedRequest),
    Notifying(Account),
    Completed {
        account: Account,
        receipt: NotificationReceipt,
    },
    Failed {
        stage: StageName,
        record: FailureRecord,
    },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Received,
    Validating,
    Creating,
    Notifying,
    Completed,
    Failed,
}

impl PipelineState {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Received(_) => Phase::Received,
            Self::Validating(_) => Phase::Validating,
            Self::Creating(_) => Phase::Creating,
            Self::Notifying(_) => Phase::Notifying,
            Self::Completed { .. } => Phase::Completed,
            Self::Failed { .. } => Phase::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    /// Stage that owns the current phase; `None` once terminal.
    pub fn active_stage(&self) -> Option<StageName> {
        match self {
            Self::Received(_) | Self::Validating(_) => Some(StageName::Validation),
            Self::Creating(_) => Some(StageName::Creation),
            Self::Notifying(_) => Some(StageName::Notification),
            Self::Completed { .. } | Self::Failed { .. } => None,
        }
    }
}

/// Outcome fed into [`transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Started,
    Validated(ValidatedRequest),
    AccountCreated(Account),
    ConfirmationSent(NotificationReceipt),
    StageFailed(StageFailure),
}

impl PipelineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Validated(_) => "validated",
            Self::AccountCreated(_) => "account_created",
            Self::ConfirmationSent(_) => "confirmation_sent",
            Self::StageFailed(_) => "stage_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("pipeline already terminated in phase {phase:?}")]
    Terminal { phase: Phase },
    #[error("event '{event}' is not valid in phase {phase:?}")]
    Unexpected { phase: Phase, event: &'static str },
}

/// Pure transition function of the signup state machine.
pub fn transition(
    state: PipelineState,
    event: PipelineEvent,
) -> Result<PipelineState, TransitionError> {
    use PipelineEvent as E;
    use PipelineState as S;

    match (state, event) {
        (S::Received(request), E::Started) => Ok(S::Validating(request)),
        (S::Validating(_), E::Validated(validated)) => Ok(S::Creating(validated)),
        (S::Creating(_), E::AccountCreated(account)) => Ok(S::Notifying(account)),
        (S::Notifying(account), E::ConfirmationSent(receipt)) => {
            Ok(S::Completed { account, receipt })
        }
        (state, E::StageFailed(failure)) => match state.active_stage() {
            Some(stage) => Ok(S::Failed {
                stage,
                record: FailureRecord::from_stage_failure(stage, &failure),
            }),
            None => Err(TransitionError::Terminal {
                phase: state.phase(),
            }),
        },
        (state, event) => {
            if state.is_terminal() {
                Err(TransitionError::Terminal {
                    phase: state.phase(),
                })
            } else {
                Err(TransitionError::Unexpected {
                    phase: state.phase(),
                    event: event.name(),
                })
            }
        }
    }
}

/// Whole-run retry policy. Only resource failures are retried, and always
/// from the start of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// Delay before the attempt following `attempt` (1-based), doubling each
    /// time.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(1u32 << exponent)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub retry: RetryPolicy,
    /// Deactivate the created account when its confirmation cannot be sent.
    pub compensate_on_notify_failure: bool,
}

/// Terminal result of one orchestrated run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub state: PipelineState,
    pub attempts: u32,
    pub failure_ack: Option<FailureAck>,
}

impl PipelineReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.state, PipelineState::Completed { .. })
    }

    pub fn account(&self) -> Option<&Account> {
        match &self.state {
            PipelineState::Completed { account, .. } => Some(account),
            _ => None,
        }
    }

    pub fn receipt(&self) -> Option<&NotificationReceipt> {
        match &self.state {
            PipelineState::Completed { receipt, .. } => Some(receipt),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureRecord> {
        match &self.state {
            PipelineState::Failed { record, .. } => Some(record),
            _ => None,
        }
    }
}

/// Sequences the stages and routes every failure to the failure stage.
pub struct Orchestrator<S> {
    stages: S,
    config: OrchestratorConfig,
}

impl<S: SignupStages> Orchestrator<S> {
    pub fn new(stages: S, config: OrchestratorConfig) -> Self {
        Self { stages, config }
    }

    pub fn stages(&self) -> &S {
        &self.stages
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Runs the pipeline to a terminal state. Never returns an error: the
    /// caller observes either a completed run or a single failure record.
    ///
    /// Retry backoff sleeps on the calling thread. Async callers run this
    /// under `tokio::task::block_in_place` or `spawn_blocking`.
    pub fn run(&self, request: SignupRequest) -> PipelineReport {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            let state = self.run_attempt(request.clone());

            if let PipelineState::Failed { stage, record } = &state {
                if record.error_kind.is_retryable() && attempt < max_attempts {
                    let delay = self.config.retry.delay_after(attempt);
                    warn!(
                        component = "orchestrator",
                        event = "attempt_failed",
                        attempt,
                        max_attempts,
                        stage = stage.as_str(),
                        error_kind = record.error_kind.as_str(),
                        retry_in_ms = delay.as_millis() as u64,
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                    continue;
                }
            }

            return self.finish(state, attempt);
        }
    }

    /// Terminates a request that never decoded into a [`SignupRequest`].
    /// Only the failure stage runs; it is attributed to validation.
    pub fn reject(&self, failure: StageFailure) -> PipelineReport {
        let stage = StageName::Validation;
        let state = PipelineState::Failed {
            stage,
            record: FailureRecord::from_stage_failure(stage, &failure),
        };
        self.finish(state, 1)
    }

    fn run_attempt(&self, request: SignupRequest) -> PipelineState {
        let mut state = PipelineState::Received(request);

        loop {
            let event = match &state {
                PipelineState::Received(_) => PipelineEvent::Started,
                PipelineState::Validating(request) => {
                    self.invoke(StageName::Validation, || self.stages.validate(request))
                        .map_or_else(PipelineEvent::StageFailed, PipelineEvent::Validated)
                }
                PipelineState::Creating(validated) => self
                    .invoke(StageName::Creation, || self.stages.create_account(validated))
                    .map_or_else(PipelineEvent::StageFailed, PipelineEvent::AccountCreated),
                PipelineState::Notifying(account) => {
                    match self.invoke(StageName::Notification, || {
                        self.stages.send_confirmation(account)
                    }) {
                        Ok(receipt) => PipelineEvent::ConfirmationSent(receipt),
                        Err(failure) => {
                            PipelineEvent::StageFailed(self.compensate(account, failure))
                        }
                    }
                }
                PipelineState::Completed { .. } | PipelineState::Failed { .. } => return state,
            };

            let stage = state.active_stage().unwrap_or(StageName::Failure);
            state = match transition(state, event) {
                Ok(next) => next,
                Err(error) => {
                    error!(
                        component = "orchestrator",
                        event = "invalid_transition",
                        error = %error,
                    );
                    PipelineState::Failed {
                        stage,
                        record: FailureRecord::from_stage_failure(
                            stage,
                            &StageFailure::new(ErrorKind::StageUnavailable, error.to_string()),
                        ),
                    }
                }
            };
        }
    }

    fn invoke<T>(
        &self,
        stage: StageName,
        call: impl FnOnce() -> Result<T, StageFailure>,
    ) -> Result<T, StageFailure> {
        let started_at = Instant::now();
        let result = call();
        let duration_ms = started_at.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => info!(
                component = "orchestrator",
                event = "stage_succeeded",
                stage = stage.as_str(),
                duration_ms,
            ),
            Err(failure) => warn!(
                component = "orchestrator",
                event = "stage_failed",
                stage = stage.as_str(),
                error_kind = failure.kind.as_str(),
                message = %failure.message,
                duration_ms,
            ),
        }

        result
    }

    fn compensate(&self, account: &Account, failure: StageFailure) -> StageFailure {
        if !self.config.compensate_on_notify_failure {
            return failure;
        }

        match self.stages.compensate(account) {
            Ok(()) => {
                info!(
                    component = "orchestrator",
                    event = "account_compensated",
                    account_id = account.account_id(),
                );
                failure
            }
            Err(compensation) => {
                error!(
                    component = "orchestrator",
                    event = "compensation_failed",
                    account_id = account.account_id(),
                    error = %compensation,
                );
                StageFailure::new(
                    failure.kind,
                    format!(
                        "{}; compensation failed: {}",
                        failure.message, compensation.message
                    ),
                )
            }
        }
    }

    fn finish(&self, state: PipelineState, attempts: u32) -> PipelineReport {
        let failure_ack = match &state {
            PipelineState::Failed { stage, record } => {
                let ack = self.stages.record_failure(record);
                warn!(
                    component = "orchestrator",
                    event = "pipeline_failed",
                    stage = stage.as_str(),
                    error_kind = record.error_kind.as_str(),
                    attempts,
                    failure_ack_degraded = ack.degraded,
                );
                Some(ack)
            }
            PipelineState::Completed { account, .. } => {
                info!(
                    component = "orchestrator",
                    event = "pipeline_completed",
                    account_id = account.account_id(),
                    attempts,
                );
                None
            }
            _ => None,
        };

        PipelineReport {
            state,
            attempts,
            failure_ack,
        }
    }
}
