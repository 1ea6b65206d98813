use crate::config::{GateConfig, Secrets};
use crate::errors::GateError;
use crate::model::RunId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// The only envelope status that counts as a successful dispatch.
pub const SUCCESS_STATUS: &str = "success";

/// Response envelope of the execution agent. Extra fields are kept for logging.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentEnvelope {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AgentEnvelope {
    pub fn success() -> Self {
        Self {
            status: Some(SUCCESS_STATUS.to_string()),
            extra: Default::default(),
        }
    }

    pub fn with_status(status: &str) -> Self {
        Self {
            status: Some(status.to_string()),
            extra: Default::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some(SUCCESS_STATUS)
    }
}

/// Remote tester. Given a run id it discovers the run's tests in the store
/// and records their outcomes out of band.
#[async_trait]
pub trait ExecutionAgent: Send + Sync {
    async fn dispatch(&self, run_id: RunId) -> anyhow::Result<AgentEnvelope>;
    fn provider_name(&self) -> &'static str;
}

pub struct HttpExecutionAgent {
    pub endpoint: String,
    pub token: Option<String>,
    pub client: reqwest::Client,
}

impl HttpExecutionAgent {
    pub fn new(endpoint: String, token: Option<String>) -> Self {
        Self {
            endpoint,
            token,
            client: reqwest::Client::new(),
        }
    }

    /// Endpoint from config, bearer token from `PRGATE_AGENT_TOKEN`.
    pub fn from_config(cfg: &GateConfig, secrets: &Secrets) -> Result<Self, GateError> {
        let endpoint = cfg.require_agent_endpoint()?;
        Ok(Self::new(endpoint.to_string(), secrets.agent_token.clone()))
    }
}

#[async_trait]
impl ExecutionAgent for HttpExecutionAgent {
    async fn dispatch(&self, run_id: RunId) -> anyhow::Result<AgentEnvelope> {
        let mut req = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&json!({ "run_id": run_id }));
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("agent HTTP error ({}): {}", status, error_text);
        }

        let envelope: AgentEnvelope = resp
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("agent response is not a JSON envelope: {}", e))?;
        Ok(envelope)
    }

    fn provider_name(&self) -> &'static str {
        "http"
    }
}
