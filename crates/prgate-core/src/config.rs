use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "prgate.yaml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    pub db_path: PathBuf,
    /// Where the change is deployed; quoted in synthesized test summaries.
    pub deployment_url: String,
    /// Short description of the application, passed to the generator.
    pub app_summary: String,
    pub store_timeout_secs: u64,
    pub agent: AgentSettings,
    pub generator: GeneratorSettings,
    pub github: GithubSettings,
    pub log_level: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(".prgate/prgate.db"),
            deployment_url: "the preview deployment".to_string(),
            app_summary: String::new(),
            store_timeout_secs: 5,
            agent: AgentSettings::default(),
            generator: GeneratorSettings::default(),
            github: GithubSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentSettings {
    pub endpoint: Option<String>,
    /// The agent's own execution budget.
    pub budget_secs: u64,
    /// Added to the budget so a slow agent is not mistaken for a hung one.
    pub margin_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            budget_secs: 600,
            margin_secs: 60,
        }
    }
}

impl AgentSettings {
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.budget_secs.saturating_add(self.margin_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorSettings {
    pub model: String,
    pub max_scenarios: usize,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_scenarios: 12,
            temperature: 0.2,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GithubSettings {
    pub api_base: String,
    pub max_diff_bytes: usize,
    pub timeout_secs: u64,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            max_diff_bytes: 64 * 1024,
            timeout_secs: 30,
        }
    }
}

/// Secrets never live in the config file.
#[derive(Clone, Default)]
pub struct Secrets {
    pub openai_api_key: Option<String>,
    pub github_token: Option<String>,
    pub agent_token: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: non_empty_env("OPENAI_API_KEY"),
            github_token: non_empty_env("GITHUB_TOKEN"),
            agent_token: non_empty_env("PRGATE_AGENT_TOKEN"),
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "***"))
            .field("github_token", &self.github_token.as_ref().map(|_| "***"))
            .field("agent_token", &self.agent_token.as_ref().map(|_| "***"))
            .finish()
    }
}

impl GateConfig {
    /// Loads `path` (if given, or the default file if present), then applies
    /// `PRGATE_*` environment overrides and validates the result.
    pub fn load(path: Option<&Path>, strict: bool) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p, strict)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH), strict)?
            }
            None => Self::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path, strict: bool) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
        Self::from_yaml(&raw, strict)
            .map_err(|e| ConfigError(format!("{} (file: {})", e.0, path.display())))
    }

    pub fn from_yaml(raw: &str, strict: bool) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut ignored = BTreeSet::new();
        let deserializer = serde_yaml::Deserializer::from_str(raw);
        let cfg: GateConfig = serde_ignored::deserialize(deserializer, |path| {
            ignored.insert(path.to_string());
        })
        .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

        if !ignored.is_empty() {
            if strict {
                return Err(ConfigError(format!(
                    "unknown fields detected in strict mode: {:?}",
                    ignored
                )));
            }
            tracing::warn!(event = "config_unknown_fields", fields = ?ignored);
        }
        Ok(cfg)
    }

    /// Applies overrides from a variable lookup (the process environment in production).
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("PRGATE_DB") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = get("PRGATE_DEPLOYMENT_URL") {
            self.deployment_url = v;
        }
        if let Some(v) = get("PRGATE_AGENT_URL") {
            self.agent.endpoint = Some(v);
        }
        if let Some(n) = get("PRGATE_AGENT_BUDGET_SECS").and_then(|v| v.parse().ok()) {
            self.agent.budget_secs = n;
        }
        if let Some(v) = get("PRGATE_MODEL") {
            self.generator.model = v;
        }
        if let Some(n) = get("PRGATE_MAX_SCENARIOS").and_then(|v| v.parse().ok()) {
            self.generator.max_scenarios = n;
        }
        if let Some(v) = get("PRGATE_GITHUB_API") {
            self.github.api_base = v;
        }
        if let Some(v) = get("PRGATE_LOG") {
            self.log_level = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.budget_secs == 0 {
            return Err(ConfigError("agent.budget_secs must be > 0".into()));
        }
        if self.store_timeout_secs == 0 {
            return Err(ConfigError("store_timeout_secs must be > 0".into()));
        }
        if self.generator.timeout_secs == 0 || self.github.timeout_secs == 0 {
            return Err(ConfigError("timeouts must be > 0".into()));
        }
        if self.generator.max_scenarios == 0 {
            return Err(ConfigError("generator.max_scenarios must be > 0".into()));
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn require_agent_endpoint(&self) -> Result<&str, ConfigError> {
        self.agent
            .endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| {
                ConfigError("no execution agent configured (agent.endpoint or PRGATE_AGENT_URL)".into())
            })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
