//! Shared signup pipeline domain primitives.
//!
//! This crate owns the stage contract, validation rules, idempotency key
//! derivation and the orchestration state machine. It intentionally excludes
//! AWS SDK and Lambda runtime concerns, which live in
//! `signup_pipeline_lambda`.

pub mod contract;
pub mod idempotency;
pub mod orchestrator;
pub mod stages;
pub mod storage_keys;
pub mod validation;
