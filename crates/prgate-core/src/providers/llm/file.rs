use super::ScenarioGenerator;
use crate::model::{GenerationContext, ScenarioDraft};
use async_trait::async_trait;
use std::path::PathBuf;

/// Reads pre-authored scenarios from a YAML or JSON file; ignores the context.
pub struct FileScenarioGenerator {
    pub path: PathBuf,
}

impl FileScenarioGenerator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ScenarioGenerator for FileScenarioGenerator {
    async fn generate(&self, _ctx: &GenerationContext) -> anyhow::Result<Vec<ScenarioDraft>> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            anyhow::anyhow!("failed to read scenarios {}: {}", self.path.display(), e)
        })?;
        super::parse_scenarios(&raw)
    }

    fn provider_name(&self) -> &'static str {
        "file"
    }
}
