use crate::model::ChangeMetadata;
use async_trait::async_trait;
use regex::Regex;
use std::time::Duration;

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, reference: &str) -> anyhow::Result<ChangeMetadata>;
    fn provider_name(&self) -> &'static str;
}

/// A pull request address: `owner/repo#N` or a github.com pull URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl ChangeRef {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        let url = Regex::new(r"^https?://github\.com/([\w.-]+)/([\w.-]+)/pull/(\d+)/?$")?;
        let short = Regex::new(r"^([\w.-]+)/([\w.-]+)#(\d+)$")?;

        let caps = url
            .captures(s)
            .or_else(|| short.captures(s))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "unrecognized change reference {:?} (expected owner/repo#N or a pull request URL)",
                    s
                )
            })?;

        Ok(Self {
            owner: caps[1].to_string(),
            repo: caps[2].to_string(),
            number: caps[3].parse()?,
        })
    }

    pub fn url(&self) -> String {
        format!(
            "https://github.com/{}/{}/pull/{}",
            self.owner, self.repo, self.number
        )
    }
}

pub struct GithubMetadataSource {
    pub api_base: String,
    pub token: Option<String>,
    pub max_diff_bytes: usize,
    pub client: reqwest::Client,
}

impl GithubMetadataSource {
    pub fn new(
        api_base: String,
        token: Option<String>,
        max_diff_bytes: usize,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("prgate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            api_base,
            token,
            max_diff_bytes,
            client,
        })
    }

    async fn get(&self, url: &str, accept: &str) -> anyhow::Result<reqwest::Response> {
        let mut req = self.client.get(url).header("Accept", accept);
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("GitHub API error ({}): {}", status, error_text);
        }
        Ok(resp)
    }
}

#[async_trait]
impl MetadataSource for GithubMetadataSource {
    async fn fetch(&self, reference: &str) -> anyhow::Result<ChangeMetadata> {
        let change = ChangeRef::parse(reference)?;
        let url = format!(
            "{}/repos/{}/{}/pulls/{}",
            self.api_base.trim_end_matches('/'),
            change.owner,
            change.repo,
            change.number
        );

        let json: serde_json::Value = self
            .get(&url, "application/vnd.github+json")
            .await?
            .json()
            .await?;
        let title = json
            .get("title")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("GitHub API response missing title"))?
            .to_string();
        let body = json
            .get("body")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let diff = self
            .get(&url, "application/vnd.github.v3.diff")
            .await?
            .text()
            .await?;
        let diff_text = truncate_bytes(&diff, self.max_diff_bytes);
        if diff_text.len() < diff.len() {
            tracing::debug!(
                event = "diff_truncated",
                original_bytes = diff.len(),
                kept_bytes = diff_text.len()
            );
        }

        Ok(ChangeMetadata {
            source_ref: change.url(),
            title,
            body,
            diff_text: diff_text.to_string(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "github"
    }
}

/// Fixed metadata, for runs whose scenarios do not come from the change itself.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadataSource {
    pub title: String,
    pub body: String,
    pub diff_text: String,
}

#[async_trait]
impl MetadataSource for StaticMetadataSource {
    async fn fetch(&self, reference: &str) -> anyhow::Result<ChangeMetadata> {
        let source_ref = match ChangeRef::parse(reference) {
            Ok(c) => c.url(),
            Err(_) => reference.trim().to_string(),
        };
        if source_ref.is_empty() {
            anyhow::bail!("empty change reference");
        }
        Ok(ChangeMetadata {
            source_ref,
            title: self.title.clone(),
            body: self.body.clone(),
            diff_text: self.diff_text.clone(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "static"
    }
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
pub fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
