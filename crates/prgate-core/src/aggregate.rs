//! Rollup of test outcomes into a run verdict.
//!
//! Suites carry no pass/fail state of their own; the verdict is computed over
//! every test of every suite. A test without an outcome is never a pass.

use crate::model::{OutcomeSummary, RunHierarchy, RunStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Verdict {
    pub status: RunStatus,
    pub passed: u32,
    pub failed: u32,
    pub pending: u32,
    pub total: u32,
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        self.status == RunStatus::Passed
    }

    pub fn summary(&self) -> OutcomeSummary {
        OutcomeSummary {
            passed: self.passed,
            failed: self.failed,
            pending: self.pending,
            total: self.total,
        }
    }
}

/// Pure: the same snapshot always yields the same verdict.
pub fn aggregate(run: &RunHierarchy) -> Verdict {
    let mut passed = 0u32;
    let mut failed = 0u32;
    let mut pending = 0u32;

    for t in run.tests() {
        match t.outcome {
            Some(true) => passed += 1,
            Some(false) => failed += 1,
            None => pending += 1,
        }
    }

    let total = passed + failed + pending;
    let status = if total > 0 && passed == total {
        RunStatus::Passed
    } else {
        RunStatus::Failed
    };

    Verdict {
        status,
        passed,
        failed,
        pending,
        total,
    }
}
