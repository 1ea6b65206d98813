use super::HierarchyRepository;
use crate::errors::StoreError;
use crate::model::{
    NewTest, OutcomeSummary, RunHierarchy, RunId, RunMeta, RunStatus, RunUpdate, SuiteId,
    SuiteRecord, TestId, TestRecord, TestUpdate,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Clone)]
pub struct Store {
    pub conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Opens a file-backed store. `timeout` bounds how long any statement
    /// waits on a locked database.
    pub fn open(path: &Path, timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(timeout)?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(super::schema::DDL)?;
        Ok(())
    }

    pub fn count_rows(&self, table: &str) -> Result<i64, StoreError> {
        if !["runs", "suites", "tests"].contains(&table) {
            return Err(StoreError::Corrupt(format!(
                "invalid table name for count_rows: {}",
                table
            )));
        }
        let conn = self.lock()?;
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let n: i64 = conn.query_row(&sql, [], |r| r.get(0))?;
        Ok(n)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl HierarchyRepository for Store {
    fn create_run(&self, meta: &RunMeta) -> Result<RunId, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = now_rfc3339();
        // A rerun of the same change reopens its run instead of failing on the unique key.
        let id: i64 = tx.query_row(
            "INSERT INTO runs(source_ref, outcome_summary, status, created_at, updated_at)
             VALUES (?1, NULL, ?2, ?3, ?3)
             ON CONFLICT(source_ref) DO UPDATE SET
                status=excluded.status,
                outcome_summary=NULL,
                updated_at=excluded.updated_at
             RETURNING id",
            params![meta.source_ref, RunStatus::Running.as_str(), now],
            |r| r.get(0),
        )?;
        // Outcomes from an earlier attempt do not carry over, including tests
        // the new scenario set no longer contains.
        let reset = tx.execute(
            "UPDATE tests SET outcome=NULL, status=?1, updated_at=?2
             WHERE suite_id IN (SELECT id FROM suites WHERE run_id = ?3)",
            params![RunStatus::Running.as_str(), now, id],
        )?;
        tx.commit()?;
        if reset > 0 {
            tracing::debug!(event = "run_reopened", run_id = id, tests_reset = reset);
        }
        Ok(RunId(id))
    }

    fn create_suite(&self, run_id: RunId, name: &str) -> Result<SuiteId, StoreError> {
        let conn = self.lock()?;
        let id: i64 = conn.query_row(
            "INSERT INTO suites(run_id, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(run_id, name) DO UPDATE SET name=excluded.name
             RETURNING id",
            params![run_id.0, name, now_rfc3339()],
            |r| r.get(0),
        )?;
        Ok(SuiteId(id))
    }

    fn upsert_tests(&self, suite_id: SuiteId, tests: &[NewTest]) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let now = now_rfc3339();
            let mut stmt = tx.prepare(
                "INSERT INTO tests(suite_id, name, summary, outcome, status, updated_at)
                 VALUES (?1, ?2, ?3, NULL, ?4, ?5)
                 ON CONFLICT(name) DO UPDATE SET
                    suite_id=excluded.suite_id,
                    summary=excluded.summary,
                    outcome=NULL,
                    status=excluded.status,
                    updated_at=excluded.updated_at",
            )?;
            for t in tests {
                stmt.execute(params![
                    suite_id.0,
                    t.name,
                    t.summary,
                    RunStatus::Running.as_str(),
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn read_hierarchy(&self, run_id: RunId) -> Result<RunHierarchy, StoreError> {
        let conn = self.lock()?;

        let run: Option<(String, String, Option<String>)> = conn
            .query_row(
                "SELECT source_ref, status, outcome_summary FROM runs WHERE id = ?1",
                params![run_id.0],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        let Some((source_ref, status, summary_json)) = run else {
            return Err(StoreError::RunNotFound(run_id));
        };

        let outcome_summary: Option<OutcomeSummary> = match summary_json {
            Some(s) if !s.trim().is_empty() => Some(serde_json::from_str(&s)?),
            _ => None,
        };

        let mut stmt =
            conn.prepare("SELECT id, name FROM suites WHERE run_id = ?1 ORDER BY id ASC")?;
        let mut suites = stmt
            .query_map(params![run_id.0], |r| {
                Ok(SuiteRecord {
                    id: SuiteId(r.get(0)?),
                    run_id,
                    name: r.get(1)?,
                    tests: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT t.id, t.suite_id, t.name, t.summary, t.outcome, t.status
             FROM tests t
             JOIN suites s ON t.suite_id = s.id
             WHERE s.run_id = ?1
             ORDER BY t.id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id.0], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, i64>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, Option<bool>>(4)?,
                    r.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for (id, suite_id, name, summary, outcome, status) in rows {
            let status = parse_status(&status)?;
            let suite = suites
                .iter_mut()
                .find(|s| s.id.0 == suite_id)
                .ok_or_else(|| StoreError::Corrupt(format!("test {} has no suite", id)))?;
            suite.tests.push(TestRecord {
                id: TestId(id),
                suite_id: SuiteId(suite_id),
                name,
                summary,
                outcome,
                status,
            });
        }

        Ok(RunHierarchy {
            id: run_id,
            source_ref,
            status: parse_status(&status)?,
            outcome_summary,
            suites,
        })
    }

    fn update_run(&self, run_id: RunId, update: &RunUpdate) -> Result<(), StoreError> {
        let summary_json = update
            .outcome_summary
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE runs SET
                status=COALESCE(?1, status),
                outcome_summary=COALESCE(?2, outcome_summary),
                updated_at=?3
             WHERE id=?4",
            params![
                update.status.map(|s| s.as_str()),
                summary_json,
                now_rfc3339(),
                run_id.0
            ],
        )?;
        if n == 0 {
            return Err(StoreError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn update_test(&self, test_id: TestId, update: &TestUpdate) -> Result<(), StoreError> {
        let status = update.outcome.map(|o| RunStatus::for_outcome(Some(o)).as_str());
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE tests SET
                outcome=COALESCE(?1, outcome),
                status=COALESCE(?2, status),
                summary=COALESCE(?3, summary),
                updated_at=?4
             WHERE id=?5",
            params![
                update.outcome,
                status,
                update.summary,
                now_rfc3339(),
                test_id.0
            ],
        )?;
        if n == 0 {
            return Err(StoreError::TestNotFound(test_id));
        }
        Ok(())
    }
}

fn parse_status(s: &str) -> Result<RunStatus, StoreError> {
    RunStatus::parse(s).ok_or_else(|| StoreError::Corrupt(format!("unknown status {:?}", s)))
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
