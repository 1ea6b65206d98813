use crate::model::{RunId, TestId};
use std::time::Duration;

/// Failure reported by the hierarchy store. Returned verbatim, never retried.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store connection lock poisoned")]
    LockPoisoned,
    #[error("run {0} not found")]
    RunNotFound(RunId),
    #[error("test {0} not found")]
    TestNotFound(TestId),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Why a dispatch to the execution agent did not succeed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("agent call timed out after {0:?}")]
    Timeout(Duration),
    #[error("agent call failed: {0}")]
    Transport(String),
    #[error("agent returned status {status:?}")]
    Rejected { status: String },
}

/// Errors that end a gate attempt without a verdict.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("upstream fetch failed: {0:#}")]
    UpstreamFetch(anyhow::Error),
    #[error("could not create run record: {0}")]
    RunCreate(#[source] StoreError),
    #[error("could not read run hierarchy: {0}")]
    VerificationRead(#[source] StoreError),
    #[error("config error: {0}")]
    Config(String),
}

#[derive(Debug, thiserror::Error)]
#[error("config error: {0}")]
pub struct ConfigError(pub String);

impl From<ConfigError> for GateError {
    fn from(e: ConfigError) -> Self {
        GateError::Config(e.0)
    }
}
