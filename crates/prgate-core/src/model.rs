use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! store_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

store_id!(RunId);
store_id!(SuiteId);
store_id!(TestId);

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioType {
    Ui,
    Api,
    Integration,
    #[default]
    E2e,
}

impl ScenarioType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioType::Ui => "ui",
            ScenarioType::Api => "api",
            ScenarioType::Integration => "integration",
            ScenarioType::E2e => "e2e",
        }
    }
}

/// A scenario as produced by the generator, before normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScenarioDraft {
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, rename = "type")]
    pub kind: ScenarioType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Read-only view of the change under test.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChangeMetadata {
    /// Canonical reference recorded on the run (PR link).
    pub source_ref: String,
    pub title: String,
    pub body: String,
    pub diff_text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GenerationContext {
    pub summary: String,
    pub title: String,
    pub body: String,
    pub diff_text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Passed,
    Failed,
}

/// Tests share the run status vocabulary.
pub type TestStatus = RunStatus;

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Passed => "PASSED",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(RunStatus::Running),
            "PASSED" => Some(RunStatus::Passed),
            "FAILED" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    /// The only status consistent with a given test outcome.
    pub fn for_outcome(outcome: Option<bool>) -> Self {
        match outcome {
            None => RunStatus::Running,
            Some(true) => RunStatus::Passed,
            Some(false) => RunStatus::Failed,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutcomeSummary {
    pub passed: u32,
    pub failed: u32,
    /// Tests with no recorded outcome. Never counted as passed.
    pub pending: u32,
    pub total: u32,
}

/// Input to the repository when creating a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunMeta {
    pub source_ref: String,
}

/// Test row as written at dispatch time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTest {
    pub name: String,
    pub summary: String,
}

/// Partial run update. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunUpdate {
    pub status: Option<RunStatus>,
    pub outcome_summary: Option<OutcomeSummary>,
}

/// Partial test update. `None` leaves the column unchanged; setting an outcome
/// also sets the matching status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestUpdate {
    pub outcome: Option<bool>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestRecord {
    pub id: TestId,
    pub suite_id: SuiteId,
    pub name: String,
    pub summary: String,
    pub outcome: Option<bool>,
    pub status: TestStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuiteRecord {
    pub id: SuiteId,
    pub run_id: RunId,
    pub name: String,
    pub tests: Vec<TestRecord>,
}

/// Snapshot of a run with its suites and their tests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunHierarchy {
    pub id: RunId,
    pub source_ref: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome_summary: Option<OutcomeSummary>,
    pub suites: Vec<SuiteRecord>,
}

impl RunHierarchy {
    pub fn tests(&self) -> impl Iterator<Item = &TestRecord> {
        self.suites.iter().flat_map(|s| s.tests.iter())
    }
}

/// Display name of the suite holding a persona's scenarios.
pub fn suite_name(persona: &str) -> String {
    format!("{} Agent Suite", persona)
}

/// Persisted test name, unique across the whole store.
///
/// Scoped by run so two changes never share a row, and by persona so equal
/// descriptions under different personas stay distinct. Persona labels never
/// contain `]` (see `scenarios::persona_label`), so the name is unambiguous.
pub fn test_name(run_id: RunId, persona: &str, description: &str) -> String {
    format!("#{} [{}] {}", run_id, persona, description)
}
