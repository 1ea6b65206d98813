use super::ScenarioGenerator;
use crate::model::{GenerationContext, ScenarioDraft};
use async_trait::async_trait;
use serde_json::json;

const SYSTEM_PROMPT: &str = "You write end-to-end test scenarios for pull requests. \
Reply with a JSON object {\"scenarios\": [...]}. Each scenario has: \
description (one sentence, unique), priority (high|medium|low), \
type (ui|api|integration|e2e), persona (the actor, e.g. new_user, admin), \
steps (array of short imperative steps) and summary (instructions for a tester).";

pub struct OpenAiScenarioGenerator {
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub max_scenarios: usize,
    pub client: reqwest::Client,
}

impl OpenAiScenarioGenerator {
    pub fn new(model: String, api_key: String, temperature: f32, max_scenarios: usize) -> Self {
        Self {
            model,
            api_key,
            temperature,
            max_scenarios,
            client: reqwest::Client::new(),
        }
    }

    fn user_prompt(&self, ctx: &GenerationContext) -> String {
        let mut content = String::new();
        if !ctx.summary.trim().is_empty() {
            content.push_str(&format!("Application:\n{}\n\n", ctx.summary));
        }
        content.push_str(&format!(
            "Pull request title: {}\n\nDescription:\n{}\n\nDiff:\n{}\n\nWrite at most {} scenarios.",
            ctx.title, ctx.body, ctx.diff_text, self.max_scenarios
        ));
        content
    }
}

#[async_trait]
impl ScenarioGenerator for OpenAiScenarioGenerator {
    async fn generate(&self, ctx: &GenerationContext) -> anyhow::Result<Vec<ScenarioDraft>> {
        let url = "https://api.openai.com/v1/chat/completions";

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": self.user_prompt(ctx) },
            ],
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
        });

        let resp = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI chat API error: {}", error_text);
        }

        let json: serde_json::Value = resp.json().await?;

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("OpenAI API response missing content"))?;

        let mut drafts = super::parse_scenarios(text)?;
        if drafts.len() > self.max_scenarios {
            tracing::debug!(
                event = "scenarios_truncated",
                generated = drafts.len(),
                kept = self.max_scenarios
            );
            drafts.truncate(self.max_scenarios);
        }
        Ok(drafts)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
