use crate::model::RunHierarchy;
use std::path::Path;

pub fn write_junit(run: &RunHierarchy, out: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(out, render_junit(run))?;
    Ok(())
}

pub fn render_junit(run: &RunHierarchy) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(&format!(
        r#"<testsuites name="{}">"#,
        escape(&run.source_ref)
    ));
    xml.push('\n');

    for suite in &run.suites {
        let failures = suite.tests.iter().filter(|t| t.outcome == Some(false)).count();
        let errors = suite.tests.iter().filter(|t| t.outcome.is_none()).count();
        xml.push_str(&format!(
            r#"  <testsuite name="{}" tests="{}" failures="{}" errors="{}">"#,
            escape(&suite.name),
            suite.tests.len(),
            failures,
            errors
        ));
        xml.push('\n');

        for t in &suite.tests {
            xml.push_str(&format!(r#"    <testcase name="{}">"#, escape(&t.name)));
            match t.outcome {
                Some(true) => {}
                Some(false) => xml.push_str(&format!(
                    r#"<failure message="{}"/>"#,
                    escape(&t.summary)
                )),
                None => xml.push_str(r#"<error message="no outcome recorded"/>"#),
            }
            xml.push_str("</testcase>\n");
        }
        xml.push_str("  </testsuite>\n");
    }

    xml.push_str("</testsuites>\n");
    xml
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
