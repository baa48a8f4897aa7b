/*!

The `report` module writes a JUnit-style XML report for a suite run, one file per suite, using a
parallel-worker-indexed filename under the artifacts directory.

!*/

use crate::error::{self, Result};
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The report file for one suite run: `<artifacts>/junit.<suite>.<worker>.xml`.
pub fn report_path(artifacts: &Path, suite_name: &str, worker_index: usize) -> PathBuf {
    artifacts.join(format!("junit.{}.{}.xml", suite_name, worker_index))
}

struct TestCase {
    name: String,
    duration: Duration,
    failure: Option<String>,
}

/// A JUnit report accumulating named, timed cases.
pub struct JunitReport {
    suite_name: String,
    cases: Vec<TestCase>,
}

impl JunitReport {
    pub fn new<S>(suite_name: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            suite_name: suite_name.into(),
            cases: Vec::new(),
        }
    }

    /// Record one case. `failure` of `None` means the case passed.
    pub fn record<S>(&mut self, name: S, duration: Duration, failure: Option<String>)
    where
        S: Into<String>,
    {
        self.cases.push(TestCase {
            name: name.into(),
            duration,
            failure,
        });
    }

    pub fn has_failures(&self) -> bool {
        self.cases.iter().any(|case| case.failure.is_some())
    }

    /// Write the report, creating the artifacts directory if needed.
    pub async fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context(error::FileSnafu { path: parent })?;
        }
        tokio::fs::write(path, self.render())
            .await
            .context(error::FileSnafu { path })
    }

    fn render(&self) -> String {
        let failures = self
            .cases
            .iter()
            .filter(|case| case.failure.is_some())
            .count();
        let total_time: f64 = self
            .cases
            .iter()
            .map(|case| case.duration.as_secs_f64())
            .sum();
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str(&format!(
            "<testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" time=\"{:.3}\">\n",
            escape(&self.suite_name),
            self.cases.len(),
            failures,
            total_time,
        ));
        for case in &self.cases {
            match &case.failure {
                None => xml.push_str(&format!(
                    "  <testcase name=\"{}\" time=\"{:.3}\"/>\n",
                    escape(&case.name),
                    case.duration.as_secs_f64(),
                )),
                Some(message) => xml.push_str(&format!(
                    "  <testcase name=\"{}\" time=\"{:.3}\">\n    <failure message=\"{}\"/>\n  </testcase>\n",
                    escape(&case.name),
                    case.duration.as_secs_f64(),
                    escape(message),
                )),
            }
        }
        xml.push_str("</testsuite>\n");
        xml
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn report_path_is_worker_indexed() {
        assert_eq!(
            report_path(Path::new("/tmp/art"), "e2e_suite", 3),
            Path::new("/tmp/art/junit.e2e_suite.3.xml")
        );
    }

    #[test]
    fn render_includes_cases_and_counts() {
        let mut report = JunitReport::new("e2e_suite");
        report.record("set_up", Duration::from_millis(1500), None);
        report.record(
            "ready default/demo",
            Duration::from_secs(300),
            Some("Deployment 'default/demo' did not become ready within 300s".to_string()),
        );
        assert!(report.has_failures());

        let xml = report.render();
        assert!(xml.contains("tests=\"2\""));
        assert!(xml.contains("failures=\"1\""));
        assert!(xml.contains("<testcase name=\"set_up\" time=\"1.500\"/>"));
        assert!(xml.contains("failure message=\"Deployment &apos;"));
    }

    #[test]
    fn escape_handles_xml_metacharacters() {
        assert_eq!(escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }

    #[tokio::test]
    async fn write_creates_the_artifacts_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = report_path(&dir.path().join("nested"), "e2e_suite", 1);
        let report = JunitReport::new("e2e_suite");
        report.write(&path).await.unwrap();
        assert!(path.is_file());
    }
}
