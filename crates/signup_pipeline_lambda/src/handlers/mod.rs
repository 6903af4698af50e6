pub mod create_account;
pub mod notify_failure;
pub mod pipeline;
pub mod send_confirmation;
pub mod validate;
