pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  source_ref TEXT NOT NULL UNIQUE,
  outcome_summary TEXT,
  status TEXT NOT NULL CHECK (status IN ('RUNNING', 'PASSED', 'FAILED')),
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS suites (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  run_id INTEGER NOT NULL REFERENCES runs(id),
  name TEXT NOT NULL,
  created_at TEXT NOT NULL,
  UNIQUE (run_id, name)
);

CREATE TABLE IF NOT EXISTS tests (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  suite_id INTEGER NOT NULL REFERENCES suites(id),
  name TEXT NOT NULL UNIQUE,
  summary TEXT NOT NULL,
  outcome INTEGER,
  status TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  CHECK (
    (outcome IS NULL AND status = 'RUNNING')
    OR (outcome = 1 AND status = 'PASSED')
    OR (outcome = 0 AND status = 'FAILED')
  )
);

CREATE INDEX IF NOT EXISTS idx_suites_run_id ON suites(run_id);
CREATE INDEX IF NOT EXISTS idx_tests_suite_id ON tests(suite_id);
"#;
