//! Task source reading the pending set from a JSON file.
//!
//! The file holds a JSON array of task records. It is re-read on every load,
//! so an external process can rewrite it between passes.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{DispatchError, TaskSource};

/// Task source backed by a JSON array file.
#[derive(Debug, Clone)]
pub struct FileTaskSource {
    path: PathBuf,
}

impl FileTaskSource {
    /// Source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TaskSource for FileTaskSource {
    async fn load_pending(&self) -> Result<Vec<Value>, DispatchError> {
        let raw = tokio::fs::read(&self.path).await.map_err(|e| {
            DispatchError::Intake(format!("read {}: {e}", self.path.display()))
        })?;
        serde_json::from_slice(&raw).map_err(|e| {
            DispatchError::Intake(format!("parse {}: {e}", self.path.display()))
        })
    }
}
