use crate::errors::StoreError;
use crate::model::{NewTest, RunHierarchy, RunId, RunMeta, RunUpdate, SuiteId, TestId, TestUpdate};

pub mod schema;
pub mod store;

pub use store::Store;

/// Data access over the run → suite → test hierarchy. No business logic and
/// no retries: every error is handed back to the caller as-is.
pub trait HierarchyRepository: Send + Sync {
    /// Creates the run for a change, or reopens it when the change already has one.
    /// Reopening clears the outcome of every test already under the run.
    fn create_run(&self, meta: &RunMeta) -> Result<RunId, StoreError>;

    fn create_suite(&self, run_id: RunId, name: &str) -> Result<SuiteId, StoreError>;

    /// Inserts tests, overwriting any existing test with the same name.
    /// Callers must not pass duplicate names in one call.
    fn upsert_tests(&self, suite_id: SuiteId, tests: &[NewTest]) -> Result<(), StoreError>;

    fn read_hierarchy(&self, run_id: RunId) -> Result<RunHierarchy, StoreError>;

    fn update_run(&self, run_id: RunId, update: &RunUpdate) -> Result<(), StoreError>;

    /// Records a test outcome. Used by the execution side, never by the orchestrator.
    fn update_test(&self, test_id: TestId, update: &TestUpdate) -> Result<(), StoreError>;
}
