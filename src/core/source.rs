//! Source of pending build tasks.

use async_trait::async_trait;

use crate::core::DispatchError;

/// Intake-side provider of the pending task set.
///
/// Records are handed over as raw JSON objects; the scheduler validates each
/// one separately so a single bad record never spoils the batch.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Load every task currently waiting to be built.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Intake`] when the intake system cannot be reached or
    /// answers with something other than a list of records.
    async fn load_pending(&self) -> Result<Vec<serde_json::Value>, DispatchError>;
}
