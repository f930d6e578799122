use async_trait::async_trait;
use hal_core::{Composite, CompositeResult, ModelNode, Operation, Outcome};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{DispatchError, DispatchResult, Dispatcher};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:9990/management";

#[derive(Debug, Clone)]
pub struct HttpDispatcherConfig {
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout: Duration,
}

impl Default for HttpDispatcherConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            username: None,
            password: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Posts operations as JSON to the HTTP management endpoint.
pub struct HttpDispatcher {
    client: reqwest::Client,
    config: HttpDispatcherConfig,
}

impl HttpDispatcher {
    pub fn new(config: HttpDispatcherConfig) -> DispatchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    async fn post(&self, body: &ModelNode) -> DispatchResult<ModelNode> {
        let mut request = self.client.post(&self.config.endpoint).json(body);
        if let Some(username) = &self.config.username {
            request = request.basic_auth(username, self.config.password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        let status = response.status();

        // failed operations come back as HTTP 500 with a regular JSON body
        let body: ModelNode = response.json().await.map_err(|e| {
            warn!(%status, error = %e, "Undecodable management response");
            DispatchError::Transport(format!("HTTP {}: {}", status, e))
        })?;

        match Outcome::from_response(&body)? {
            Outcome::Success(result) => Ok(result),
            Outcome::Failed(description) => Err(DispatchError::Failure(description)),
        }
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn execute(&self, operation: &Operation) -> DispatchResult<ModelNode> {
        debug!(%operation, "Dispatching operation");
        self.post(&operation.to_model()).await
    }

    async fn execute_composite(&self, composite: &Composite) -> DispatchResult<CompositeResult> {
        debug!(steps = composite.len(), "Dispatching composite");
        let result = self.post(&composite.to_model()).await?;
        Ok(CompositeResult::from_result(&result)?)
    }
}
