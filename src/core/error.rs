//! Error types for dispatch operations.

use thiserror::Error;

use crate::core::launcher::LaunchError;
use crate::core::task::TaskId;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The pending set could not be loaded; the whole pass is skipped.
    #[error("intake unavailable: {0}")]
    Intake(String),
    /// A worker could not be launched.
    #[error("launch failed: {0}")]
    Launch(#[from] LaunchError),
    /// The task is running; its backend priority is frozen.
    #[error("task {0} is running")]
    TaskRunning(TaskId),
    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
