//! Driver-level errors.

use kittyfuzz_data::StoreError;
use kittyfuzz_model::ModelError;
use kittyfuzz_target::TargetError;
use thiserror::Error;

/// Fatal session failures. Configuration and compatibility problems stop
/// the session before any target interaction; the driver never retries.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The option line or configuration was rejected.
    #[error("invalid fuzzer options: {0}")]
    Config(String),
    /// A stored session does not match the live template or engine.
    #[error("stored session is incompatible: {0}")]
    SessionIncompatible(String),
    /// The pristine pre-session test did not pass.
    #[error("environment not ready: {0}")]
    EnvironmentNotReady(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Target(#[from] TargetError),
}
