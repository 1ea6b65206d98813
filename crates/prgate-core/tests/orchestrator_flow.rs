use async_trait::async_trait;
use prgate_core::engine::{GatePipeline, Orchestrator, RunPhase};
use prgate_core::errors::{GateError, StoreError};
use prgate_core::model::{
    GenerationContext, NewTest, RunHierarchy, RunId, RunMeta, RunStatus, RunUpdate,
    ScenarioDraft, SuiteId, TestId, TestUpdate,
};
use prgate_core::providers::agent::{AgentEnvelope, ExecutionAgent};
use prgate_core::providers::llm::ScenarioGenerator;
use prgate_core::providers::metadata::{MetadataSource, StaticMetadataSource};
use prgate_core::scenarios::ScenarioSetBuilder;
use prgate_core::storage::{HierarchyRepository, Store};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PR: &str = "https://github.com/acme/shop/pull/12";

fn draft(desc: &str, persona: &str) -> ScenarioDraft {
    ScenarioDraft {
        description: desc.into(),
        persona: Some(persona.into()),
        summary: Some(format!("verify {}", desc)),
        ..Default::default()
    }
}

fn store() -> Store {
    let s = Store::memory().unwrap();
    s.init_schema().unwrap();
    s
}

fn builder() -> ScenarioSetBuilder {
    ScenarioSetBuilder::new("https://preview.acme.dev")
}

enum Behavior {
    /// Records the outcome chosen per test name; `None` leaves the test untouched.
    Mark(fn(&str) -> Option<bool>),
    Hang,
    Status(&'static str),
    Fail,
}

struct FakeAgent {
    store: Store,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl FakeAgent {
    fn new(store: &Store, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            store: store.clone(),
            behavior,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ExecutionAgent for FakeAgent {
    async fn dispatch(&self, run_id: RunId) -> anyhow::Result<AgentEnvelope> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Mark(decide) => {
                let h = self.store.read_hierarchy(run_id)?;
                for t in h.tests() {
                    if let Some(outcome) = decide(t.name.as_str()) {
                        self.store.update_test(
                            t.id,
                            &TestUpdate {
                                outcome: Some(outcome),
                                summary: None,
                            },
                        )?;
                    }
                }
                Ok(AgentEnvelope::success())
            }
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(AgentEnvelope::success())
            }
            Behavior::Status(s) => Ok(AgentEnvelope::with_status(s)),
            Behavior::Fail => anyhow::bail!("connection refused"),
        }
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

/// Delegates to a real store, injecting failures and counting reads.
struct FaultyStore {
    inner: Store,
    fail_run: bool,
    fail_suite: Option<&'static str>,
    fail_tests_for: Option<&'static str>,
    fail_read: bool,
    fail_update: bool,
    reads: AtomicUsize,
    updates: AtomicUsize,
}

impl FaultyStore {
    fn new(inner: &Store) -> Self {
        Self {
            inner: inner.clone(),
            fail_run: false,
            fail_suite: None,
            fail_tests_for: None,
            fail_read: false,
            fail_update: false,
            reads: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        }
    }
}

impl HierarchyRepository for FaultyStore {
    fn create_run(&self, meta: &RunMeta) -> Result<RunId, StoreError> {
        if self.fail_run {
            return Err(StoreError::Corrupt("injected run failure".into()));
        }
        self.inner.create_run(meta)
    }

    fn create_suite(&self, run_id: RunId, name: &str) -> Result<SuiteId, StoreError> {
        if self.fail_suite.is_some_and(|f| f == name) {
            return Err(StoreError::Corrupt("injected suite failure".into()));
        }
        self.inner.create_suite(run_id, name)
    }

    fn upsert_tests(&self, suite_id: SuiteId, tests: &[NewTest]) -> Result<(), StoreError> {
        if let Some(p) = self.fail_tests_for {
            if tests.iter().any(|t| t.name.contains(&format!("[{}] ", p))) {
                return Err(StoreError::Corrupt("injected upsert failure".into()));
            }
        }
        self.inner.upsert_tests(suite_id, tests)
    }

    fn read_hierarchy(&self, run_id: RunId) -> Result<RunHierarchy, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_read {
            return Err(StoreError::Corrupt("injected read failure".into()));
        }
        self.inner.read_hierarchy(run_id)
    }

    fn update_run(&self, run_id: RunId, update: &RunUpdate) -> Result<(), StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_update {
            return Err(StoreError::Corrupt("injected update failure".into()));
        }
        self.inner.update_run(run_id, update)
    }

    fn update_test(&self, test_id: TestId, update: &TestUpdate) -> Result<(), StoreError> {
        self.inner.update_test(test_id, update)
    }
}

fn orchestrator(
    repo: Arc<dyn HierarchyRepository>,
    agent: Arc<dyn ExecutionAgent>,
    timeout: Duration,
) -> Orchestrator {
    Orchestrator::new(repo, agent, timeout)
}

#[tokio::test]
async fn test_all_passing_run_passes_gate() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let s = Store::open(&dir.path().join("gate.db"), Duration::from_secs(5))?;
    s.init_schema()?;
    let agent = FakeAgent::new(&s, Behavior::Mark(|_| Some(true)));
    let orch = orchestrator(Arc::new(s.clone()), agent.clone(), Duration::from_secs(5));

    let set = builder().build(vec![
        draft("login", "new_user"),
        draft("signup", "new_user"),
        draft("ban user", "admin"),
    ]);
    let report = orch.execute(PR, &set).await?;

    assert!(report.passed());
    assert_eq!(report.phase, RunPhase::VerifiedPass);
    let v = report.verdict.unwrap();
    assert_eq!((v.passed, v.failed, v.total), (3, 0, 3));
    assert_eq!(agent.calls.load(Ordering::SeqCst), 1);

    let h = s.read_hierarchy(report.run_id)?;
    assert_eq!(h.status, RunStatus::Passed);
    assert_eq!(h.outcome_summary.map(|o| o.total), Some(3));
    let suites: Vec<_> = h.suites.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(suites, vec!["new_user Agent Suite", "admin Agent Suite"]);
    Ok(())
}

#[tokio::test]
async fn test_unfinished_test_fails_gate() -> anyhow::Result<()> {
    let s = store();
    let agent = FakeAgent::new(
        &s,
        Behavior::Mark(|name| if name.ends_with("c") { None } else { Some(true) }),
    );
    let orch = orchestrator(Arc::new(s.clone()), agent, Duration::from_secs(5));

    let set = builder().build(vec![draft("a", "p"), draft("b", "p"), draft("c", "p")]);
    let report = orch.execute(PR, &set).await?;

    assert_eq!(report.phase, RunPhase::VerifiedFail);
    let v = report.verdict.unwrap();
    assert_eq!(v.status, RunStatus::Failed);
    assert_eq!((v.passed, v.pending, v.total), (2, 1, 3));
    assert_eq!(s.read_hierarchy(report.run_id)?.status, RunStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn test_dispatch_timeout_aborts_without_verification() -> anyhow::Result<()> {
    let s = store();
    let repo = Arc::new(FaultyStore::new(&s));
    let agent = FakeAgent::new(&s, Behavior::Hang);
    let orch = orchestrator(repo.clone(), agent, Duration::from_millis(50));

    let set = builder().build(vec![draft("a", "p")]);
    let report = orch.execute(PR, &set).await?;

    assert_eq!(report.phase, RunPhase::Aborted);
    assert!(!report.passed());
    assert!(report.verdict.is_none());
    assert!(report.abort_reason.unwrap().contains("timed out"));
    assert_eq!(repo.reads.load(Ordering::SeqCst), 0);

    let h = s.read_hierarchy(report.run_id)?;
    assert_eq!(h.status, RunStatus::Failed);
    assert!(h.outcome_summary.is_none());
    // persisted rows stay as an audit record
    assert_eq!(h.tests().count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_non_success_envelope_aborts() -> anyhow::Result<()> {
    for status in ["error", "SUCCESS", "pending"] {
        let s = store();
        let agent = FakeAgent::new(&s, Behavior::Status(status));
        let orch = orchestrator(Arc::new(s.clone()), agent, Duration::from_secs(5));

        let report = orch
            .execute(PR, &builder().build(vec![draft("a", "p")]))
            .await?;
        assert_eq!(report.phase, RunPhase::Aborted, "status {}", status);
        assert_eq!(s.read_hierarchy(report.run_id)?.status, RunStatus::Failed);
    }
    Ok(())
}

#[tokio::test]
async fn test_transport_error_aborts() -> anyhow::Result<()> {
    let s = store();
    let agent = FakeAgent::new(&s, Behavior::Fail);
    let orch = orchestrator(Arc::new(s.clone()), agent, Duration::from_secs(5));

    let report = orch
        .execute(PR, &builder().build(vec![draft("a", "p")]))
        .await?;
    assert_eq!(report.phase, RunPhase::Aborted);
    assert!(report.abort_reason.unwrap().contains("connection refused"));
    Ok(())
}

#[tokio::test]
async fn test_failed_run_insert_never_dispatches() {
    let s = store();
    let mut faulty = FaultyStore::new(&s);
    faulty.fail_run = true;
    let agent = FakeAgent::new(&s, Behavior::Mark(|_| Some(true)));
    let orch = orchestrator(Arc::new(faulty), agent.clone(), Duration::from_secs(5));

    let res = orch
        .execute(PR, &builder().build(vec![draft("a", "p")]))
        .await;
    assert!(matches!(res, Err(GateError::RunCreate(_))));
    assert_eq!(agent.calls.load(Ordering::SeqCst), 0);
    assert_eq!(s.count_rows("tests").unwrap(), 0);
}

#[tokio::test]
async fn test_suite_failure_skips_only_that_persona() -> anyhow::Result<()> {
    let s = store();
    let mut faulty = FaultyStore::new(&s);
    faulty.fail_suite = Some("admin Agent Suite");
    faulty.fail_tests_for = Some("guest");
    let agent = FakeAgent::new(&s, Behavior::Mark(|_| Some(true)));
    let orch = orchestrator(Arc::new(faulty), agent.clone(), Duration::from_secs(5));

    let set = builder().build(vec![
        draft("ban user", "admin"),
        draft("browse", "guest"),
        draft("buy", "buyer"),
    ]);
    let report = orch.execute(PR, &set).await?;

    let skipped: Vec<_> = report.skipped.iter().map(|s| s.persona.as_str()).collect();
    assert_eq!(skipped, vec!["admin", "guest"]);
    assert_eq!(agent.calls.load(Ordering::SeqCst), 1);
    assert!(report.passed());
    assert_eq!(report.verdict.unwrap().total, 1);

    // the guest suite row was created before its tests failed; it stays, empty
    let h = s.read_hierarchy(report.run_id)?;
    let suites: Vec<_> = h
        .suites
        .iter()
        .map(|s| (s.name.as_str(), s.tests.len()))
        .collect();
    assert_eq!(suites, vec![("guest Agent Suite", 0), ("buyer Agent Suite", 1)]);
    Ok(())
}

#[tokio::test]
async fn test_no_persisted_tests_fails_gate() -> anyhow::Result<()> {
    let s = store();
    let mut faulty = FaultyStore::new(&s);
    faulty.fail_suite = Some("p Agent Suite");
    let agent = FakeAgent::new(&s, Behavior::Mark(|_| Some(true)));
    let orch = orchestrator(Arc::new(faulty), agent, Duration::from_secs(5));

    let report = orch
        .execute(PR, &builder().build(vec![draft("a", "p")]))
        .await?;
    assert_eq!(report.phase, RunPhase::VerifiedFail);
    let v = report.verdict.unwrap();
    assert_eq!(v.total, 0);
    assert_eq!(v.status, RunStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn test_fifth_persona_never_reaches_storage() -> anyhow::Result<()> {
    let s = store();
    let agent = FakeAgent::new(&s, Behavior::Mark(|_| Some(true)));
    let orch = orchestrator(Arc::new(s.clone()), agent, Duration::from_secs(5));

    let set = builder().build(vec![
        draft("a1", "a"),
        draft("b1", "b"),
        draft("c1", "c"),
        draft("d1", "d"),
        draft("e1", "e"),
        draft("e2", "e"),
    ]);
    let report = orch.execute(PR, &set).await?;

    assert_eq!(s.count_rows("suites")?, 4);
    assert_eq!(s.count_rows("tests")?, 4);
    let h = s.read_hierarchy(report.run_id)?;
    assert!(h.tests().all(|t| !t.name.contains("[e]")));
    Ok(())
}

#[tokio::test]
async fn test_rerun_does_not_duplicate_tests() -> anyhow::Result<()> {
    let s = store();
    let drafts = vec![
        draft("desc1", "A"),
        draft("desc1", "A"),
        draft("desc2", "A"),
        draft("desc3", "B"),
        draft("desc3", "C"),
    ];

    let first_agent = FakeAgent::new(&s, Behavior::Mark(|n| Some(!n.contains("desc2"))));
    let first = orchestrator(Arc::new(s.clone()), first_agent, Duration::from_secs(5))
        .execute(PR, &builder().build(drafts.clone()))
        .await?;
    assert_eq!(first.verdict.unwrap().total, 4);
    assert!(!first.passed());

    let second_agent = FakeAgent::new(&s, Behavior::Mark(|_| Some(true)));
    let second = orchestrator(Arc::new(s.clone()), second_agent, Duration::from_secs(5))
        .execute(PR, &builder().build(drafts))
        .await?;

    assert_eq!(second.run_id, first.run_id);
    assert_eq!(second.verdict.unwrap().total, 4);
    assert!(second.passed());
    assert_eq!(s.count_rows("runs")?, 1);
    assert_eq!(s.count_rows("suites")?, 3);
    assert_eq!(s.count_rows("tests")?, 4);

    // the same description under two personas stays two rows
    let h = s.read_hierarchy(second.run_id)?;
    let desc3: Vec<_> = h
        .tests()
        .filter(|t| t.name.ends_with("desc3"))
        .map(|t| t.name.as_str())
        .collect();
    let run = second.run_id;
    assert_eq!(
        desc3,
        vec![format!("#{} [B] desc3", run), format!("#{} [C] desc3", run)]
    );
    Ok(())
}

#[tokio::test]
async fn test_reverify_picks_up_late_outcomes() -> anyhow::Result<()> {
    let s = store();
    let agent = FakeAgent::new(
        &s,
        Behavior::Mark(|n| if n.ends_with("slow") { None } else { Some(true) }),
    );
    let orch = orchestrator(Arc::new(s.clone()), agent, Duration::from_secs(5));

    let report = orch
        .execute(PR, &builder().build(vec![draft("fast", "p"), draft("slow", "p")]))
        .await?;
    assert!(!report.passed());

    let slow = s
        .read_hierarchy(report.run_id)?
        .tests()
        .find(|t| t.outcome.is_none())
        .map(|t| t.id)
        .unwrap();
    s.update_test(slow, &TestUpdate { outcome: Some(true), summary: None })?;

    let again = orch.reverify(report.run_id)?;
    assert!(again.passed());
    assert_eq!(s.read_hierarchy(report.run_id)?.status, RunStatus::Passed);

    assert!(matches!(
        orch.reverify(RunId(999)),
        Err(GateError::VerificationRead(StoreError::RunNotFound(_)))
    ));
    Ok(())
}

#[tokio::test]
async fn test_same_scenario_in_two_changes_keeps_separate_tests() -> anyhow::Result<()> {
    let s = store();
    let set = builder().build(vec![draft("user can log in", "default")]);

    let pass_all = FakeAgent::new(&s, Behavior::Mark(|_| Some(true)));
    let first = orchestrator(Arc::new(s.clone()), pass_all, Duration::from_secs(5))
        .execute(PR, &set)
        .await?;
    assert!(first.passed());

    let other_pr = "https://github.com/acme/shop/pull/13";
    let fail_all = FakeAgent::new(&s, Behavior::Mark(|_| Some(false)));
    let second = orchestrator(Arc::new(s.clone()), fail_all, Duration::from_secs(5))
        .execute(other_pr, &set)
        .await?;
    assert_ne!(second.run_id, first.run_id);
    assert!(!second.passed());
    assert_eq!(second.verdict.unwrap().total, 1);

    // the first change's test is still its own, with its own outcome
    let again = prgate_core::engine::reverify(&s, first.run_id)?;
    assert!(again.passed());
    assert_eq!(again.verdict.unwrap().total, 1);
    assert_eq!(s.count_rows("tests")?, 2);
    Ok(())
}

#[tokio::test]
async fn test_rerun_with_smaller_set_ignores_stale_outcomes() -> anyhow::Result<()> {
    let s = store();

    let pass_all = FakeAgent::new(&s, Behavior::Mark(|_| Some(true)));
    let first = orchestrator(Arc::new(s.clone()), pass_all, Duration::from_secs(5))
        .execute(PR, &builder().build(vec![draft("old", "p"), draft("new", "p")]))
        .await?;
    assert!(first.passed());

    // The regenerated set drops "old"; the agent only gets to "new", which fails.
    let agent = FakeAgent::new(
        &s,
        Behavior::Mark(|n| if n.ends_with("new") { Some(false) } else { None }),
    );
    let rerun = orchestrator(Arc::new(s.clone()), agent, Duration::from_secs(5))
        .execute(PR, &builder().build(vec![draft("new", "p")]))
        .await?;

    assert_eq!(rerun.run_id, first.run_id);
    let v = rerun.verdict.unwrap();
    assert_eq!((v.passed, v.failed, v.pending, v.total), (0, 1, 1, 2));
    assert_eq!(v.status, RunStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn test_verification_read_failure_aborts_run() -> anyhow::Result<()> {
    let s = store();
    let mut faulty = FaultyStore::new(&s);
    faulty.fail_read = true;
    let repo = Arc::new(faulty);
    let agent = FakeAgent::new(&s, Behavior::Mark(|_| Some(true)));
    let orch = orchestrator(repo.clone(), agent.clone(), Duration::from_secs(5));

    let res = orch
        .execute(PR, &builder().build(vec![draft("a", "p")]))
        .await;
    assert!(matches!(res, Err(GateError::VerificationRead(_))));
    assert_eq!(agent.calls.load(Ordering::SeqCst), 1);
    assert_eq!(repo.reads.load(Ordering::SeqCst), 1);

    // the run is forced to FAILED even though every test passed
    let h = s.read_hierarchy(RunId(1))?;
    assert_eq!(h.status, RunStatus::Failed);
    assert!(h.outcome_summary.is_none());
    assert!(h.tests().all(|t| t.outcome == Some(true)));
    Ok(())
}

#[tokio::test]
async fn test_failed_abort_write_is_not_retried() -> anyhow::Result<()> {
    let s = store();
    let mut faulty = FaultyStore::new(&s);
    faulty.fail_update = true;
    let repo = Arc::new(faulty);
    let agent = FakeAgent::new(&s, Behavior::Status("error"));
    let orch = orchestrator(repo.clone(), agent, Duration::from_secs(5));

    let report = orch
        .execute(PR, &builder().build(vec![draft("a", "p")]))
        .await?;

    assert_eq!(report.phase, RunPhase::Aborted);
    assert!(!report.passed());
    assert_eq!(repo.updates.load(Ordering::SeqCst), 1);
    assert_eq!(repo.reads.load(Ordering::SeqCst), 0);
    // the status write never landed
    assert_eq!(s.read_hierarchy(report.run_id)?.status, RunStatus::Running);
    Ok(())
}

struct FixedGenerator(Vec<ScenarioDraft>);

#[async_trait]
impl ScenarioGenerator for FixedGenerator {
    async fn generate(&self, _ctx: &GenerationContext) -> anyhow::Result<Vec<ScenarioDraft>> {
        Ok(self.0.clone())
    }

    fn provider_name(&self) -> &'static str {
        "fixed"
    }
}

struct SlowGenerator;

#[async_trait]
impl ScenarioGenerator for SlowGenerator {
    async fn generate(&self, _ctx: &GenerationContext) -> anyhow::Result<Vec<ScenarioDraft>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(vec![])
    }

    fn provider_name(&self) -> &'static str {
        "slow"
    }
}

struct BrokenMetadata;

#[async_trait]
impl MetadataSource for BrokenMetadata {
    async fn fetch(&self, _reference: &str) -> anyhow::Result<prgate_core::model::ChangeMetadata> {
        anyhow::bail!("GitHub API error (502 Bad Gateway)")
    }

    fn provider_name(&self) -> &'static str {
        "broken"
    }
}

fn pipeline(
    metadata: Arc<dyn MetadataSource>,
    generator: Arc<dyn ScenarioGenerator>,
) -> GatePipeline {
    GatePipeline {
        metadata,
        generator,
        builder: builder(),
        app_summary: "a shop".into(),
        generation_timeout: Duration::from_millis(100),
    }
}

#[tokio::test]
async fn test_pipeline_runs_gate_on_canonical_ref() -> anyhow::Result<()> {
    let s = store();
    let agent = FakeAgent::new(&s, Behavior::Mark(|_| Some(true)));
    let orch = orchestrator(Arc::new(s.clone()), agent, Duration::from_secs(5));
    let p = pipeline(
        Arc::new(StaticMetadataSource::default()),
        Arc::new(FixedGenerator(vec![draft("a", "p")])),
    );

    let report = p.run(&orch, "acme/shop#12").await?;
    assert!(report.passed());
    assert_eq!(report.source_ref, PR);
    assert_eq!(s.read_hierarchy(report.run_id)?.source_ref, PR);
    Ok(())
}

#[tokio::test]
async fn test_upstream_failures_persist_nothing() {
    let s = store();
    let agent = FakeAgent::new(&s, Behavior::Mark(|_| Some(true)));
    let orch = orchestrator(Arc::new(s.clone()), agent.clone(), Duration::from_secs(5));

    let broken_meta = pipeline(
        Arc::new(BrokenMetadata),
        Arc::new(FixedGenerator(vec![draft("a", "p")])),
    );
    assert!(matches!(
        broken_meta.run(&orch, PR).await,
        Err(GateError::UpstreamFetch(_))
    ));

    let slow_gen = pipeline(Arc::new(StaticMetadataSource::default()), Arc::new(SlowGenerator));
    let err = slow_gen.run(&orch, PR).await.unwrap_err();
    assert!(err.to_string().contains("timed out"));

    assert_eq!(s.count_rows("runs").unwrap(), 0);
    assert_eq!(agent.calls.load(Ordering::SeqCst), 0);
}
