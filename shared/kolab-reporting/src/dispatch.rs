//! HTTP notification dispatcher for hosted serverless functions

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::delivery::{CollaboratorError, NotificationDispatcher};

#[derive(Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpDispatcher {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn function_url(&self, function_name: &str) -> String {
        format!("{}/functions/v1/{}", self.base_url, function_name)
    }
}

#[async_trait]
impl NotificationDispatcher for HttpDispatcher {
    async fn invoke(&self, function_name: &str, payload: Value) -> Result<(), CollaboratorError> {
        let url = self.function_url(function_name);
        debug!(%url, "Invoking function");

        let mut request = self.client.post(&url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        request
            .send()
            .await
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| CollaboratorError::Dispatch(e.to_string()))?;

        Ok(())
    }
}
