//! AWS-oriented adapters and handlers for the signup pipeline.
//!
//! This crate owns runtime integration details (Lambda handlers, queue
//! dispatch, object storage and stage invocation) and exposes a single
//! runtime module boundary for the contract, validation and orchestration
//! primitives of `signup_pipeline_core`.

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod logging;
pub mod runtime;
pub mod stages;
