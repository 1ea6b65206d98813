use crate::model::{GenerationContext, ScenarioDraft};
use async_trait::async_trait;
use serde::Deserialize;

#[async_trait]
pub trait ScenarioGenerator: Send + Sync {
    async fn generate(&self, ctx: &GenerationContext) -> anyhow::Result<Vec<ScenarioDraft>>;
    fn provider_name(&self) -> &'static str;
}

pub mod file;
pub mod openai;

/// Accepted payload shapes: `{"scenarios": [...]}` or a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScenarioPayload {
    Wrapped { scenarios: Vec<ScenarioDraft> },
    Bare(Vec<ScenarioDraft>),
}

impl ScenarioPayload {
    fn into_drafts(self) -> Vec<ScenarioDraft> {
        match self {
            ScenarioPayload::Wrapped { scenarios } => scenarios,
            ScenarioPayload::Bare(v) => v,
        }
    }
}

/// Parses generator output. YAML is a superset of JSON, so both are accepted.
pub fn parse_scenarios(raw: &str) -> anyhow::Result<Vec<ScenarioDraft>> {
    let payload: ScenarioPayload = serde_yaml::from_str(raw)
        .map_err(|e| anyhow::anyhow!("malformed scenario payload: {}", e))?;
    Ok(payload.into_drafts())
}
