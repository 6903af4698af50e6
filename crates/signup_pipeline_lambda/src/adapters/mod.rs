pub mod account_store;
pub mod aws;
pub mod dispatch;
pub mod invoke;
pub mod object_store;
