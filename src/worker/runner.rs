//! Test runner: executes a worker's shard one test at a time.
//!
//! For each test:
//! 1. Derive the slug from the path relative to the source root
//! 2. Create the per-test log (kept after the run)
//! 3. Run the test command with the file as its last argument
//! 4. Write the JUnit result file unless the test command already did
//!
//! The first failing test ends the run.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::context::WorkerContext;
use crate::discovery::TestFile;
use crate::error::{ResourceError, Result, TestFailure};
use crate::exec::{CommandRunner, CommandSpec};
use crate::logs::{LogDir, slug_for_path};
use crate::report::{self, JunitCase, TestOutcome};

/// Variables exported to every test process.
pub mod env {
    pub const RESULT_FILE: &str = "CI_TEST_RESULT_FILE";
    pub const WORKER_INDEX: &str = "CI_WORKER_INDEX";
    pub const WORKER_TOTAL: &str = "CI_WORKER_TOTAL";
}

/// Sequential, fail-fast test runner.
pub struct TestRunner {
    runner: Arc<dyn CommandRunner>,
    worker: WorkerContext,
    source_root: PathBuf,
    results_dir: PathBuf,
    test_command: String,
}

impl TestRunner {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        worker: WorkerContext,
        source_root: &Path,
        results_dir: &Path,
        test_command: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            worker,
            source_root: source_root.to_path_buf(),
            results_dir: results_dir.to_path_buf(),
            test_command: test_command.into(),
        }
    }

    /// Run `tests` in order, logging into `logs`.
    ///
    /// Returns the outcomes of all tests when every test passed. On the first
    /// failure returns [`TestFailure`] naming the test and its log; tests after
    /// it are never started. `on_outcome` sees every finished test, the
    /// failing one included.
    pub async fn run<F>(
        &self,
        tests: &[TestFile],
        logs: &LogDir,
        mut on_outcome: F,
    ) -> Result<Vec<TestOutcome>>
    where
        F: FnMut(&TestOutcome),
    {
        let mut outcomes = Vec::with_capacity(tests.len());
        let mut slugs = SlugSet::default();
        let total = tests.len();

        for (position, test) in tests.iter().enumerate() {
            let slug = slugs.claim(test.relative());
            let log = logs.test_log(&slug);
            let result_file = report::result_path(&self.results_dir, &slug);

            logs.create_log(&log).await?;
            remove_stale(&result_file).await?;

            tracing::info!(
                test = %test.relative().display(),
                position = position + 1,
                total,
                log = %log.display(),
                "Running test"
            );

            let spec = CommandSpec::new(
                test.relative().display().to_string(),
                &self.test_command,
                &self.source_root,
            )
            .with_arg(test.path().display().to_string())
            .with_env(env::RESULT_FILE, result_file.display().to_string())
            .with_env(env::WORKER_INDEX, self.worker.index().to_string())
            .with_env(env::WORKER_TOTAL, self.worker.total().to_string());

            let started = Utc::now();
            let (exit_code, duration, failure) = match self.runner.run(&spec, &log).await {
                Ok(outcome) if outcome.success() => (outcome.exit_code, outcome.duration, None),
                Ok(outcome) => (
                    outcome.exit_code,
                    outcome.duration,
                    Some(outcome.describe()),
                ),
                Err(e) => (
                    None,
                    std::time::Duration::ZERO,
                    Some(format!("could not start test command: {e}")),
                ),
            };

            if tokio::fs::metadata(&result_file).await.is_err() {
                let name = test.relative().display().to_string();
                let case = JunitCase {
                    suite: self.worker.id(),
                    name: &name,
                    duration,
                    timestamp: started,
                    failure: failure.clone(),
                    log: &log,
                };
                match report::write_junit(&result_file, &case).await {
                    Ok(()) => {}
                    // A failed test is reported as a test failure even without its result file.
                    Err(e) if failure.is_some() => {
                        tracing::warn!(error = %e, "Could not write result file for failed test");
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            let outcome = TestOutcome {
                test: test.relative().to_path_buf(),
                passed: failure.is_none(),
                exit_code,
                duration_ms: duration.as_millis() as u64,
                log: log.clone(),
                result_file,
            };
            on_outcome(&outcome);

            if let Some(reason) = failure {
                tracing::error!(
                    test = %test.relative().display(),
                    reason = %reason,
                    log = %log.display(),
                    "Test failed"
                );
                return Err(TestFailure {
                    test: test.path().to_path_buf(),
                    log,
                    exit_code,
                    reason,
                }
                .into());
            }
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }
}

/// Slugs handed out during one run. A path whose slug is already taken gets
/// a numeric suffix so its log and result file stay separate.
#[derive(Debug, Default)]
struct SlugSet {
    seen: HashMap<String, usize>,
}

impl SlugSet {
    fn claim(&mut self, relative: &Path) -> String {
        let base = slug_for_path(relative);
        let count = self.seen.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            return base;
        }
        let slug = format!("{base}_{count}");
        tracing::warn!(
            test = %relative.display(),
            slug = %slug,
            "Slug collides with an earlier test, using a suffix"
        );
        slug
    }
}

/// Remove a result file left by an earlier run, so a missing one is noticed.
async fn remove_stale(path: &Path) -> std::result::Result<(), ResourceError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ResourceError::Write {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::exec::testing::ScriptedRunner;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        results: PathBuf,
        logs: LogDir,
    }

    impl Fixture {
        fn runner(&self, scripted: Arc<ScriptedRunner>) -> TestRunner {
            TestRunner::new(
                scripted,
                WorkerContext::solo(),
                &self.root,
                &self.results,
                "node",
            )
        }
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("src");
        let results = dir.path().join("reports");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&results).unwrap();
        let logs = LogDir::new(results.join("logs"), None);
        logs.ensure().await.unwrap();
        Fixture {
            _dir: dir,
            root,
            results,
            logs,
        }
    }

    fn tests(root: &Path, names: &[&str]) -> Vec<TestFile> {
        names
            .iter()
            .map(|n| TestFile::new(root.to_path_buf(), PathBuf::from(n)))
            .collect()
    }

    #[tokio::test]
    async fn all_pass_writes_logs_and_results() {
        let fx = fixture().await;
        let scripted = Arc::new(ScriptedRunner::passing());
        let runner = TestRunner::new(
            scripted.clone(),
            WorkerContext::solo(),
            &fx.root,
            &fx.results,
            "node",
        );

        let shard = tests(&fx.root, &["a/test/test-one.js", "b/test/test-two.js"]);
        let outcomes = runner.run(&shard, &fx.logs, |_| {}).await.unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.passed));
        assert!(fx.logs.test_log("a_test_test_one_js").exists());
        assert!(fx.results.join("test-results.b_test_test_two_js.xml").exists());

        let calls = scripted.calls();
        assert_eq!(calls[0].command, "node");
        assert_eq!(
            calls[0].args,
            vec![fx.root.join("a/test/test-one.js").display().to_string()]
        );
        assert!(calls[0].env.iter().any(|(k, v)| k == env::WORKER_TOTAL && v == "1"));
    }

    #[tokio::test]
    async fn stops_at_first_failure() {
        let fx = fixture().await;
        let scripted = Arc::new(ScriptedRunner::failing_on("t2.js", 1));
        let runner = TestRunner::new(
            scripted.clone(),
            WorkerContext::solo(),
            &fx.root,
            &fx.results,
            "node",
        );

        let shard = tests(&fx.root, &["t1.js", "t2.js", "t3.js", "t4.js"]);
        let mut seen = Vec::new();
        let err = runner
            .run(&shard, &fx.logs, |o| seen.push(o.passed))
            .await
            .unwrap_err();

        match err {
            Error::Test(failure) => {
                assert_eq!(failure.test, fx.root.join("t2.js"));
                assert_eq!(failure.log, fx.logs.test_log("t2_js"));
                assert_eq!(failure.exit_code, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(scripted.labels(), vec!["t1.js", "t2.js"]);
        assert_eq!(seen, vec![true, false]);
        assert!(!fx.logs.test_log("t3_js").exists());

        let xml = std::fs::read_to_string(fx.results.join("test-results.t2_js.xml")).unwrap();
        assert!(xml.contains("<failure message=\"exit code 1\""));
    }

    #[tokio::test]
    async fn unspawnable_test_is_a_failure() {
        let fx = fixture().await;
        let scripted = Arc::new(ScriptedRunner::unspawnable_on("t1.js"));
        let runner = fx.runner(scripted);

        let err = runner
            .run(&tests(&fx.root, &["t1.js"]), &fx.logs, |_| {})
            .await
            .unwrap_err();
        match err {
            Error::Test(failure) => {
                assert!(failure.exit_code.is_none());
                assert!(failure.reason.contains("could not start"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_log_dir_is_resource_error() {
        let fx = fixture().await;
        let scripted = Arc::new(ScriptedRunner::passing());
        let runner = fx.runner(scripted.clone());
        let logs = LogDir::new(fx.results.join("nope"), None);

        let err = runner
            .run(&tests(&fx.root, &["t1.js"]), &logs, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Resource(_)));
        assert!(scripted.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_shard_is_success() {
        let fx = fixture().await;
        let runner = TestRunner::new(
            Arc::new(ScriptedRunner::passing()),
            WorkerContext::solo(),
            &fx.root,
            &fx.results,
            "node",
        );
        let outcomes = runner.run(&[], &fx.logs, |_| {}).await.unwrap();
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn unwritable_result_file_keeps_test_failure() {
        let fx = fixture().await;
        let scripted = Arc::new(ScriptedRunner::failing_on("t1.js", 1));
        let runner = TestRunner::new(
            scripted,
            WorkerContext::solo(),
            &fx.root,
            &fx.results.join("gone"),
            "node",
        );

        let err = runner
            .run(&tests(&fx.root, &["t1.js"]), &fx.logs, |_| {})
            .await
            .unwrap_err();
        match err {
            Error::Test(failure) => {
                assert_eq!(failure.test, fx.root.join("t1.js"));
                assert_eq!(failure.log, fx.logs.test_log("t1_js"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unwritable_result_file_for_passing_test_is_resource_error() {
        let fx = fixture().await;
        let runner = TestRunner::new(
            Arc::new(ScriptedRunner::passing()),
            WorkerContext::solo(),
            &fx.root,
            &fx.results.join("gone"),
            "node",
        );

        let err = runner
            .run(&tests(&fx.root, &["t1.js"]), &fx.logs, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Resource(ResourceError::Write { .. })));
    }

    #[tokio::test]
    async fn stale_result_that_cannot_be_removed_stops_before_running() {
        let fx = fixture().await;
        let blocked = report::result_path(&fx.results, "t1_js");
        std::fs::create_dir_all(blocked.join("inner")).unwrap();
        let scripted = Arc::new(ScriptedRunner::failing_on("t1.js", 1));
        let runner = fx.runner(scripted.clone());

        let err = runner
            .run(&tests(&fx.root, &["t1.js"]), &fx.logs, |_| {})
            .await
            .unwrap_err();
        match err {
            Error::Resource(ResourceError::Write { path, .. }) => assert_eq!(path, blocked),
            other => panic!("unexpected error: {other}"),
        }
        assert!(scripted.calls().is_empty());
    }

    #[tokio::test]
    async fn stale_result_file_is_replaced() {
        let fx = fixture().await;
        let result = report::result_path(&fx.results, "t1_js");
        std::fs::write(&result, "old run").unwrap();
        let runner = fx.runner(Arc::new(ScriptedRunner::passing()));

        runner
            .run(&tests(&fx.root, &["t1.js"]), &fx.logs, |_| {})
            .await
            .unwrap();
        let xml = std::fs::read_to_string(&result).unwrap();
        assert!(xml.contains("<testsuite"));
    }

    #[tokio::test]
    async fn colliding_slugs_get_separate_logs() {
        let fx = fixture().await;
        let runner = fx.runner(Arc::new(ScriptedRunner::passing()));

        let shard = tests(&fx.root, &["t/test-a.js", "t/test_a.js"]);
        let outcomes = runner.run(&shard, &fx.logs, |_| {}).await.unwrap();

        assert_eq!(outcomes[0].log, fx.logs.test_log("t_test_a_js"));
        assert_eq!(outcomes[1].log, fx.logs.test_log("t_test_a_js_2"));
        assert_ne!(outcomes[0].result_file, outcomes[1].result_file);
        assert!(outcomes.iter().all(|o| o.log.exists() && o.result_file.exists()));
    }
}
