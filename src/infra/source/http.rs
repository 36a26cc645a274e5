//! Task source polling the build intake over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::core::{DispatchError, TaskSource};

/// Task source fetching the pending set with an HTTP `GET`.
///
/// The endpoint must answer with a JSON array of task records.
#[derive(Debug, Clone)]
pub struct HttpTaskSource {
    client: reqwest::Client,
    url: String,
}

impl HttpTaskSource {
    /// Source polling `url` with a 30 second request timeout.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Config`] when the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DispatchError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Endpoint polled by this source.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TaskSource for HttpTaskSource {
    async fn load_pending(&self) -> Result<Vec<Value>, DispatchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| DispatchError::Intake(format!("GET {}: {e}", self.url)))?;
        let pending: Vec<Value> = response
            .json()
            .await
            .map_err(|e| DispatchError::Intake(format!("decode {}: {e}", self.url)))?;
        debug!(url = %self.url, count = pending.len(), "pending tasks fetched");
        Ok(pending)
    }
}
