use crate::aggregate::{aggregate, Verdict};
use crate::errors::{DispatchError, GateError};
use crate::model::{
    suite_name, test_name, NewTest, RunHierarchy, RunId, RunMeta, RunStatus, RunUpdate, SuiteId,
};
use crate::providers::agent::{AgentEnvelope, ExecutionAgent};
use crate::scenarios::ScenarioSet;
use crate::storage::HierarchyRepository;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Lifecycle of one gate attempt.
///
/// `Created → Dispatched → {VerifiedPass, VerifiedFail, Aborted}`; a run that
/// cannot be dispatched goes straight from `Created` to `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Created,
    Dispatched,
    VerifiedPass,
    VerifiedFail,
    Aborted,
}

impl RunPhase {
    pub fn can_advance_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Created, Dispatched)
                | (Created, Aborted)
                | (Dispatched, VerifiedPass)
                | (Dispatched, VerifiedFail)
                | (Dispatched, Aborted)
        )
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PersistedSuite {
    pub persona: String,
    pub suite_id: SuiteId,
    pub tests: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SkippedSuite {
    pub persona: String,
    pub reason: String,
}

/// State threaded through the phases of a single run.
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    pub source_ref: String,
    pub run_id: RunId,
    pub phase: RunPhase,
    pub suites: Vec<PersistedSuite>,
    pub skipped: Vec<SkippedSuite>,
}

impl RunContext {
    fn advance(&mut self, next: RunPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal run transition {:?} -> {:?}",
            self.phase,
            next
        );
        tracing::debug!(event = "run_phase", run_id = %self.run_id, from = ?self.phase, to = ?next);
        self.phase = next;
    }

    pub fn persisted_tests(&self) -> usize {
        self.suites.iter().map(|s| s.tests).sum()
    }
}

/// Final, externally visible result of a gate attempt.
#[derive(Debug, Clone, Serialize)]
pub struct GateReport {
    pub run_id: RunId,
    pub source_ref: String,
    pub phase: RunPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedSuite>,
    #[serde(skip)]
    pub hierarchy: Option<RunHierarchy>,
}

impl GateReport {
    pub fn passed(&self) -> bool {
        self.phase == RunPhase::VerifiedPass
    }
}

pub struct Orchestrator {
    pub store: Arc<dyn HierarchyRepository>,
    pub agent: Arc<dyn ExecutionAgent>,
    /// Agent budget plus safety margin.
    pub dispatch_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn HierarchyRepository>,
        agent: Arc<dyn ExecutionAgent>,
        dispatch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            agent,
            dispatch_timeout,
        }
    }

    /// Full gate: persist, dispatch once, verify.
    pub async fn execute(&self, source_ref: &str, set: &ScenarioSet) -> Result<GateReport, GateError> {
        let mut ctx = self.materialize(source_ref, set)?;

        if let Err(e) = self.dispatch(&mut ctx).await {
            let reason = e.to_string();
            self.abort(&mut ctx, &reason);
            return Ok(GateReport {
                run_id: ctx.run_id,
                source_ref: ctx.source_ref,
                phase: ctx.phase,
                verdict: None,
                abort_reason: Some(reason),
                skipped: ctx.skipped,
                hierarchy: None,
            });
        }

        let (verdict, hierarchy) = self.verify(&mut ctx)?;
        Ok(GateReport {
            run_id: ctx.run_id,
            source_ref: ctx.source_ref,
            phase: ctx.phase,
            verdict: Some(verdict),
            abort_reason: None,
            skipped: ctx.skipped,
            hierarchy: Some(hierarchy),
        })
    }

    /// Creates the run, then one suite per persona with its tests. A persona
    /// whose suite or tests cannot be written is skipped; only a failed run
    /// insert is fatal.
    ///
    /// Nothing is rolled back: when the test upsert fails, the persona's suite
    /// row stays in the store with no tests and the persona is reported as
    /// skipped. An empty suite contributes nothing to the verdict.
    pub fn materialize(&self, source_ref: &str, set: &ScenarioSet) -> Result<RunContext, GateError> {
        let run_id = self
            .store
            .create_run(&RunMeta {
                source_ref: source_ref.to_string(),
            })
            .map_err(GateError::RunCreate)?;
        tracing::info!(event = "run_created", run_id = %run_id, source_ref = %source_ref);

        let mut ctx = RunContext {
            source_ref: source_ref.to_string(),
            run_id,
            phase: RunPhase::Created,
            suites: Vec::new(),
            skipped: Vec::new(),
        };

        for group in &set.groups {
            let name = suite_name(&group.persona);
            let suite_id = match self.store.create_suite(run_id, &name) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(
                        event = "suite_skipped",
                        run_id = %run_id,
                        persona = %group.persona,
                        error = %e
                    );
                    ctx.skipped.push(SkippedSuite {
                        persona: group.persona.clone(),
                        reason: format!("suite create failed: {}", e),
                    });
                    continue;
                }
            };

            let tests: Vec<NewTest> = group
                .tests
                .iter()
                .map(|t| NewTest {
                    name: test_name(run_id, &group.persona, &t.description),
                    summary: t.summary.clone(),
                })
                .collect();

            if let Err(e) = self.store.upsert_tests(suite_id, &tests) {
                tracing::warn!(
                    event = "suite_skipped",
                    run_id = %run_id,
                    persona = %group.persona,
                    error = %e
                );
                ctx.skipped.push(SkippedSuite {
                    persona: group.persona.clone(),
                    reason: format!("test upsert failed: {}", e),
                });
                continue;
            }

            tracing::info!(
                event = "suite_persisted",
                run_id = %run_id,
                suite_id = %suite_id,
                persona = %group.persona,
                tests = tests.len()
            );
            ctx.suites.push(PersistedSuite {
                persona: group.persona.clone(),
                suite_id,
                tests: tests.len(),
            });
        }

        Ok(ctx)
    }

    /// Invokes the agent exactly once. Anything but an explicit success
    /// envelope within the timeout is a dispatch failure.
    pub async fn dispatch(&self, ctx: &mut RunContext) -> Result<AgentEnvelope, DispatchError> {
        ctx.advance(RunPhase::Dispatched);
        tracing::info!(
            event = "run_dispatched",
            run_id = %ctx.run_id,
            agent = self.agent.provider_name(),
            tests = ctx.persisted_tests(),
            timeout_secs = self.dispatch_timeout.as_secs()
        );

        let envelope = match timeout(self.dispatch_timeout, self.agent.dispatch(ctx.run_id)).await {
            Err(_) => return Err(DispatchError::Timeout(self.dispatch_timeout)),
            Ok(Err(e)) => return Err(DispatchError::Transport(format!("{:#}", e))),
            Ok(Ok(envelope)) => envelope,
        };

        if !envelope.is_success() {
            return Err(DispatchError::Rejected {
                status: envelope.status.clone().unwrap_or_else(|| "<missing>".into()),
            });
        }
        Ok(envelope)
    }

    /// Forces the run to FAILED. The status write is best effort.
    pub fn abort(&self, ctx: &mut RunContext, reason: &str) {
        ctx.advance(RunPhase::Aborted);
        tracing::error!(event = "run_aborted", run_id = %ctx.run_id, reason = %reason);

        let update = RunUpdate {
            status: Some(RunStatus::Failed),
            outcome_summary: None,
        };
        if let Err(e) = self.store.update_run(ctx.run_id, &update) {
            tracing::warn!(event = "run_status_write_failed", run_id = %ctx.run_id, error = %e);
        }
    }

    /// Reads the hierarchy back and rolls it up. Only reached after a
    /// successful dispatch.
    pub fn verify(&self, ctx: &mut RunContext) -> Result<(Verdict, RunHierarchy), GateError> {
        let hierarchy = match self.store.read_hierarchy(ctx.run_id) {
            Ok(h) => h,
            Err(e) => {
                self.abort(ctx, &format!("verification read failed: {}", e));
                return Err(GateError::VerificationRead(e));
            }
        };

        let verdict = aggregate(&hierarchy);
        ctx.advance(if verdict.is_pass() {
            RunPhase::VerifiedPass
        } else {
            RunPhase::VerifiedFail
        });
        self.record_verdict(ctx.run_id, &verdict);
        Ok((verdict, hierarchy))
    }

    /// Re-verifies an existing run, e.g. after the agent retried some tests.
    pub fn reverify(&self, run_id: RunId) -> Result<GateReport, GateError> {
        reverify(self.store.as_ref(), run_id)
    }

    fn record_verdict(&self, run_id: RunId, verdict: &Verdict) {
        record_verdict(self.store.as_ref(), run_id, verdict)
    }
}

/// Reads a stored run back and rolls it up without any dispatch.
pub fn reverify(store: &dyn HierarchyRepository, run_id: RunId) -> Result<GateReport, GateError> {
    let hierarchy = store
        .read_hierarchy(run_id)
        .map_err(GateError::VerificationRead)?;
    let verdict = aggregate(&hierarchy);
    record_verdict(store, run_id, &verdict);

    Ok(GateReport {
        run_id,
        source_ref: hierarchy.source_ref.clone(),
        phase: if verdict.is_pass() {
            RunPhase::VerifiedPass
        } else {
            RunPhase::VerifiedFail
        },
        verdict: Some(verdict),
        abort_reason: None,
        skipped: Vec::new(),
        hierarchy: Some(hierarchy),
    })
}

fn record_verdict(store: &dyn HierarchyRepository, run_id: RunId, verdict: &Verdict) {
    tracing::info!(
        event = "run_verified",
        run_id = %run_id,
        status = %verdict.status,
        passed = verdict.passed,
        failed = verdict.failed,
        pending = verdict.pending,
        total = verdict.total
    );
    let update = RunUpdate {
        status: Some(verdict.status),
        outcome_summary: Some(verdict.summary()),
    };
    if let Err(e) = store.update_run(run_id, &update) {
        tracing::warn!(event = "run_status_write_failed", run_id = %run_id, error = %e);
    }
}
