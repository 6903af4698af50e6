pub use signup_pipeline_core::{
    contract, idempotency, orchestrator, stages, storage_keys, validation,
};
