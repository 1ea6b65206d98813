use super::orchestrator::{GateReport, Orchestrator};
use crate::config::{GateConfig, Secrets};
use crate::errors::GateError;
use crate::model::{ChangeMetadata, GenerationContext};
use crate::providers::llm::file::FileScenarioGenerator;
use crate::providers::llm::openai::OpenAiScenarioGenerator;
use crate::providers::llm::ScenarioGenerator;
use crate::providers::metadata::{GithubMetadataSource, MetadataSource, StaticMetadataSource};
use crate::scenarios::{ScenarioSet, ScenarioSetBuilder};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Change reference → metadata → generated drafts → scenario set → gate.
pub struct GatePipeline {
    pub metadata: Arc<dyn MetadataSource>,
    pub generator: Arc<dyn ScenarioGenerator>,
    pub builder: ScenarioSetBuilder,
    pub app_summary: String,
    pub generation_timeout: Duration,
}

impl GatePipeline {
    /// Wires the collaborators from config. A scenarios file means a fully
    /// offline pipeline: no LLM, no GitHub.
    pub fn from_config(
        cfg: &GateConfig,
        secrets: &Secrets,
        scenarios: Option<&Path>,
    ) -> Result<Self, GateError> {
        let (metadata, generator): (Arc<dyn MetadataSource>, Arc<dyn ScenarioGenerator>) =
            match scenarios {
                Some(path) => (
                    Arc::new(StaticMetadataSource::default()),
                    Arc::new(FileScenarioGenerator::new(path)),
                ),
                None => {
                    let key = secrets.openai_api_key.clone().ok_or_else(|| {
                        GateError::Config(
                            "OPENAI_API_KEY is not set and no scenarios file was given".into(),
                        )
                    })?;
                    let github = GithubMetadataSource::new(
                        cfg.github.api_base.clone(),
                        secrets.github_token.clone(),
                        cfg.github.max_diff_bytes,
                        Duration::from_secs(cfg.github.timeout_secs),
                    )
                    .map_err(|e| GateError::Config(format!("github client: {:#}", e)))?;
                    let openai = OpenAiScenarioGenerator::new(
                        cfg.generator.model.clone(),
                        key,
                        cfg.generator.temperature,
                        cfg.generator.max_scenarios,
                    );
                    (Arc::new(github), Arc::new(openai))
                }
            };

        Ok(Self {
            metadata,
            generator,
            builder: ScenarioSetBuilder::new(cfg.deployment_url.clone()),
            app_summary: cfg.app_summary.clone(),
            generation_timeout: Duration::from_secs(cfg.generator.timeout_secs),
        })
    }

    /// Everything up to the builder; nothing is persisted.
    pub async fn plan(&self, reference: &str) -> Result<(ChangeMetadata, ScenarioSet), GateError> {
        let meta = self
            .metadata
            .fetch(reference)
            .await
            .map_err(GateError::UpstreamFetch)?;
        tracing::info!(
            event = "change_fetched",
            provider = self.metadata.provider_name(),
            source_ref = %meta.source_ref,
            diff_bytes = meta.diff_text.len()
        );

        let ctx = GenerationContext {
            summary: self.app_summary.clone(),
            title: meta.title.clone(),
            body: meta.body.clone(),
            diff_text: meta.diff_text.clone(),
        };
        let drafts = match timeout(self.generation_timeout, self.generator.generate(&ctx)).await {
            Ok(res) => res.map_err(GateError::UpstreamFetch)?,
            Err(_) => {
                return Err(GateError::UpstreamFetch(anyhow::anyhow!(
                    "scenario generation timed out after {:?}",
                    self.generation_timeout
                )))
            }
        };
        tracing::info!(
            event = "scenarios_generated",
            provider = self.generator.provider_name(),
            drafts = drafts.len()
        );

        let set = self.builder.build(drafts);
        tracing::info!(
            event = "scenario_set_built",
            personas = ?set.personas(),
            tests = set.test_count(),
            dropped_personas = ?set.dropped_personas
        );
        Ok((meta, set))
    }

    pub async fn run(
        &self,
        orchestrator: &Orchestrator,
        reference: &str,
    ) -> Result<GateReport, GateError> {
        let (meta, set) = self.plan(reference).await?;
        orchestrator.execute(&meta.source_ref, &set).await
    }
}
