use crate::engine::{GateReport, RunPhase};
use crate::model::RunHierarchy;

pub fn print_summary(report: &GateReport) {
    eprintln!("{}", render_summary(report));
}

pub fn render_summary(report: &GateReport) -> String {
    let mut out = format!("\nRun #{} ({})\n", report.run_id, report.source_ref);

    if let Some(h) = &report.hierarchy {
        render_hierarchy(&mut out, h);
    }

    for s in &report.skipped {
        out.push_str(&format!("⚠️  {:<24} SKIPPED ({})\n", s.persona, s.reason));
    }

    match (&report.phase, &report.verdict) {
        (RunPhase::Aborted, _) => {
            out.push_str(&format!(
                "\n❌ ABORTED: {}\n",
                report.abort_reason.as_deref().unwrap_or("unknown reason")
            ));
        }
        (_, Some(v)) => {
            out.push_str(&format!(
                "\nSummary: {} passed, {} failed, {} pending, {} total\n",
                v.passed, v.failed, v.pending, v.total
            ));
            if v.is_pass() {
                out.push_str("✅ GATE PASSED\n");
            } else if v.total == 0 {
                out.push_str("❌ GATE FAILED (no tests were persisted)\n");
            } else {
                out.push_str("❌ GATE FAILED\n");
            }
        }
        (_, None) => out.push_str("\n❌ GATE FAILED (no verdict)\n"),
    }
    out
}

fn render_hierarchy(out: &mut String, h: &RunHierarchy) {
    for suite in &h.suites {
        out.push_str(&format!("{}\n", suite.name));
        if suite.tests.is_empty() {
            out.push_str("    (no tests)\n");
        }
        for t in &suite.tests {
            let icon = match t.outcome {
                Some(true) => "✅",
                Some(false) => "❌",
                None => "⏳",
            };
            out.push_str(&format!("  {} {}\n", icon, t.name));
        }
    }
}
