//! Result files: per-test JUnit XML and the worker summary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::context::WorkerContext;
use crate::error::ResourceError;
use crate::logs::slugify;
use crate::orchestrator::{OrchestratorState, StateTransition};
use crate::worker::TaskOutcome;

/// Path of the JUnit result file for a test slug.
pub fn result_path(results_dir: &Path, slug: &str) -> PathBuf {
    results_dir.join(format!("test-results.{slug}.xml"))
}

/// Path of the JSON summary for a worker.
pub fn summary_path(results_dir: &Path, worker: &WorkerContext) -> PathBuf {
    results_dir.join(format!("summary.{}.json", slugify(worker.id())))
}

/// One executed test file, rendered as a JUnit suite with a single case.
#[derive(Debug, Clone)]
pub struct JunitCase<'a> {
    /// Suite name, usually the worker id.
    pub suite: &'a str,
    /// Test path relative to the source root.
    pub name: &'a str,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
    /// Failure message; `None` when the test passed.
    pub failure: Option<String>,
    /// Log holding the test's output.
    pub log: &'a Path,
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Render a case as a JUnit document.
pub fn to_junit(case: &JunitCase<'_>) -> String {
    let failures = usize::from(case.failure.is_some());
    let secs = format!("{:.3}", case.duration.as_secs_f64());
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<testsuite name=\"{}\" tests=\"1\" failures=\"{}\" errors=\"0\" skipped=\"0\" \
         time=\"{}\" timestamp=\"{}\">\n",
        xml_escape(case.suite),
        failures,
        secs,
        case.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
    ));
    out.push_str(&format!(
        "  <testcase classname=\"{}\" name=\"{}\" time=\"{}\">",
        xml_escape(case.suite),
        xml_escape(case.name),
        secs,
    ));
    if let Some(message) = &case.failure {
        out.push_str(&format!(
            "\n    <failure message=\"{}\">see {}</failure>\n  ",
            xml_escape(message),
            xml_escape(&case.log.display().to_string()),
        ));
    }
    out.push_str("</testcase>\n");
    out.push_str(&format!(
        "  <system-out>{}</system-out>\n",
        xml_escape(&case.log.display().to_string())
    ));
    out.push_str("</testsuite>\n");
    out
}

/// Write a JUnit document to `path`.
pub async fn write_junit(path: &Path, case: &JunitCase<'_>) -> Result<(), ResourceError> {
    tokio::fs::write(path, to_junit(case))
        .await
        .map_err(|source| ResourceError::Write {
            path: path.to_path_buf(),
            source,
        })
}

/// Outcome of one executed test.
#[derive(Debug, Clone, Serialize)]
pub struct TestOutcome {
    /// Test path relative to the source root.
    pub test: PathBuf,
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub log: PathBuf,
    pub result_file: PathBuf,
}

/// Machine-readable summary of one worker run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerSummary {
    pub run_id: Uuid,
    pub worker: WorkerContext,
    pub state: OrchestratorState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub transitions: Vec<StateTransition>,
    /// Tasks this worker ran to completion, with their step outcomes.
    pub tasks: Vec<TaskOutcome>,
    /// Tests assigned to this worker, in run order.
    pub assigned_tests: Vec<PathBuf>,
    /// Tests that ran, in run order. The failing test, if any, is last.
    pub tests: Vec<TestOutcome>,
    pub failure: Option<String>,
}

impl WorkerSummary {
    pub fn new(worker: WorkerContext) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            worker,
            state: OrchestratorState::Init,
            started_at: Utc::now(),
            finished_at: None,
            transitions: Vec::new(),
            tasks: Vec::new(),
            assigned_tests: Vec::new(),
            tests: Vec::new(),
            failure: None,
        }
    }

    /// Write the summary as pretty JSON.
    pub async fn write(&self, path: &Path) -> Result<(), ResourceError> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json)
            .await
            .map_err(|source| ResourceError::Write {
                path: path.to_path_buf(),
                source,
            })
    }
}
