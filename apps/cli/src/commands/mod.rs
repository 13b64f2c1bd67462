//! Command implementations for the Tunekit CLI.

pub mod export;
pub mod finetune;
pub mod status;
pub mod summary;
