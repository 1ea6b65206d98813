//! Normalizes generated scenario drafts into a capped, persona-partitioned set.

use crate::model::{Priority, ScenarioDraft, ScenarioType};
use serde::{Deserialize, Serialize};

/// Upper bound on suites per run, set by the execution container budget.
pub const MAX_PERSONAS: usize = 4;

/// Persona used when a draft does not name one.
pub const DEFAULT_PERSONA: &str = "default";

/// Canonical persona label: brackets removed, trimmed, `default` when empty.
///
/// Persisted test names wrap the persona in `[...]`, so a label never carries
/// a bracket of its own.
pub fn persona_label(raw: Option<&str>) -> String {
    let cleaned: String = raw
        .unwrap_or_default()
        .chars()
        .filter(|c| !matches!(c, '[' | ']'))
        .collect();
    match cleaned.trim() {
        "" => DEFAULT_PERSONA.to_string(),
        p => p.to_string(),
    }
}

/// A normalized scenario, ready to become a test row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestDraft {
    pub description: String,
    pub summary: String,
    pub priority: Priority,
    #[serde(rename = "type")]
    pub kind: ScenarioType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonaGroup {
    pub persona: String,
    pub tests: Vec<TestDraft>,
}

/// Output of [`ScenarioSetBuilder::build`]. Groups keep first-appearance order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScenarioSet {
    pub groups: Vec<PersonaGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_personas: Vec<String>,
}

impl ScenarioSet {
    pub fn personas(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.persona.as_str()).collect()
    }

    pub fn get(&self, persona: &str) -> Option<&[TestDraft]> {
        self.groups
            .iter()
            .find(|g| g.persona == persona)
            .map(|g| g.tests.as_slice())
    }

    pub fn test_count(&self) -> usize {
        self.groups.iter().map(|g| g.tests.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

pub struct ScenarioSetBuilder {
    deployment: String,
}

impl ScenarioSetBuilder {
    pub fn new(deployment: impl Into<String>) -> Self {
        Self {
            deployment: deployment.into(),
        }
    }

    pub fn build(&self, drafts: Vec<ScenarioDraft>) -> ScenarioSet {
        let mut set = ScenarioSet::default();

        for draft in drafts {
            let description = draft.description.trim().to_string();
            if description.is_empty() {
                tracing::warn!(event = "scenario_dropped", reason = "blank description");
                continue;
            }

            let persona = persona_label(draft.persona.as_deref());

            let idx = match set.groups.iter().position(|g| g.persona == persona) {
                Some(i) => i,
                None if set.groups.len() < MAX_PERSONAS => {
                    set.groups.push(PersonaGroup {
                        persona: persona.clone(),
                        tests: Vec::new(),
                    });
                    set.groups.len() - 1
                }
                None => {
                    if !set.dropped_personas.contains(&persona) {
                        tracing::warn!(
                            event = "persona_dropped",
                            persona = %persona,
                            cap = MAX_PERSONAS
                        );
                        set.dropped_personas.push(persona);
                    }
                    continue;
                }
            };

            let summary = match draft.summary.as_deref().map(str::trim) {
                Some(s) if !s.is_empty() => s.to_string(),
                _ => self.synthesize_summary(&description, draft.kind, &draft.steps),
            };

            let test = TestDraft {
                description,
                summary,
                priority: draft.priority,
                kind: draft.kind,
                steps: draft.steps,
            };

            // Last occurrence wins, first position is kept.
            let tests = &mut set.groups[idx].tests;
            match tests.iter().position(|t| t.description == test.description) {
                Some(i) => tests[i] = test,
                None => tests.push(test),
            }
        }

        set
    }

    fn synthesize_summary(&self, description: &str, kind: ScenarioType, steps: &[String]) -> String {
        let mut s = format!(
            "On {}, you are testing {} scenario: {}. In this test, follow the steps to validate the expected behavior",
            self.deployment,
            kind.as_str(),
            description.trim_end_matches('.')
        );
        if steps.is_empty() {
            s.push('.');
        } else {
            s.push(':');
            for (i, step) in steps.iter().enumerate() {
                s.push_str(&format!("\n{}. {}", i + 1, step));
            }
        }
        s
    }
}
