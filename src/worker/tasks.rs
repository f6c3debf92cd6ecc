//! Pre-test tasks: dependency check, license check, lint.
//!
//! The task list is fixed and ordered. Task `p` runs on worker `p mod total`,
//! the same round-robin rule used for tests. Within a worker, tasks and their
//! steps run in order and stop at the first failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::config::CommandsConfig;
use crate::context::WorkerContext;
use crate::error::TaskError;
use crate::exec::{CommandOutcome, CommandRunner, CommandSpec};
use crate::shard;

/// Task names, in list order.
pub const CHECK_DEPS: &str = "check_deps";
pub const CHECK_LICENSES: &str = "check_licenses";
pub const LINT: &str = "lint";

/// One external command within a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    /// Shell command; empty means the step is disabled.
    pub command: String,
}

impl Step {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.command.trim().is_empty()
    }
}

/// A named pre-test task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub name: String,
    pub steps: Vec<Step>,
}

impl Task {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }
}

/// Ordered list of pre-test tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskList {
    tasks: Vec<Task>,
}

impl TaskList {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    /// The standard list: `[check_deps, check_licenses, lint]`.
    pub fn standard(commands: &CommandsConfig) -> Self {
        Self::new(vec![
            Task::new(
                CHECK_DEPS,
                vec![Step::new("check-deps", &commands.check_deps)],
            ),
            Task::new(
                CHECK_LICENSES,
                vec![Step::new("check-licenses", &commands.check_licenses)],
            ),
            Task::new(
                LINT,
                vec![
                    Step::new("lint-filenames", &commands.lint_filenames),
                    Step::new("lint-manifests", &commands.lint_manifests),
                    Step::new("lint-docs", &commands.lint_docs),
                ],
            ),
        ])
    }

    /// Tasks owned by `ctx`, in list order. Empty when workers outnumber tasks
    /// and this worker's index is past the end of the list.
    pub fn assigned(&self, ctx: &WorkerContext) -> Vec<&Task> {
        shard::assign(&self.tasks, ctx)
    }
}

/// One step that ran as part of a task.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub name: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

impl StepOutcome {
    fn new(name: &str, outcome: &CommandOutcome) -> Self {
        Self {
            name: name.to_string(),
            exit_code: outcome.exit_code,
            duration_ms: outcome.duration.as_millis() as u64,
        }
    }
}

/// Result of a completed task. Disabled steps are not listed.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub name: String,
    pub steps: Vec<StepOutcome>,
}

/// Runs tasks, appending their output to the aggregate log.
pub struct TaskRunner {
    runner: Arc<dyn CommandRunner>,
    workdir: PathBuf,
    log: PathBuf,
}

impl TaskRunner {
    pub fn new(runner: Arc<dyn CommandRunner>, workdir: &Path, log: &Path) -> Self {
        Self {
            runner,
            workdir: workdir.to_path_buf(),
            log: log.to_path_buf(),
        }
    }

    /// Run `tasks` in order. The first failing step aborts the run; no later
    /// step or task is started.
    pub async fn run(&self, tasks: &[&Task]) -> Result<Vec<TaskOutcome>, TaskError> {
        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            tracing::info!(task = %task.name, "Running task");
            outcomes.push(self.run_task(task).await?);
        }
        Ok(outcomes)
    }

    async fn run_task(&self, task: &Task) -> Result<TaskOutcome, TaskError> {
        let mut steps = Vec::with_capacity(task.steps.len());
        for step in &task.steps {
            if !step.is_enabled() {
                tracing::info!(task = %task.name, step = %step.name, "Step disabled, skipping");
                continue;
            }

            let spec = CommandSpec::new(&step.name, &step.command, &self.workdir);
            let outcome = self
                .runner
                .run(&spec, &self.log)
                .await
                .map_err(|source| TaskError::Spawn {
                    task: task.name.clone(),
                    step: step.name.clone(),
                    log: self.log.clone(),
                    source,
                })?;

            if !outcome.success() {
                tracing::error!(
                    task = %task.name,
                    step = %step.name,
                    exit_code = ?outcome.exit_code,
                    "Task step failed"
                );
                return Err(TaskError::StepFailed {
                    task: task.name.clone(),
                    step: step.name.clone(),
                    exit_code: outcome.exit_code,
                    log: self.log.clone(),
                });
            }

            let step_outcome = StepOutcome::new(&step.name, &outcome);
            tracing::debug!(
                task = %task.name,
                step = %step.name,
                duration_ms = step_outcome.duration_ms,
                "Step passed"
            );
            steps.push(step_outcome);
        }
        Ok(TaskOutcome {
            name: task.name.clone(),
            steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedRunner;

    fn list() -> TaskList {
        TaskList::standard(&CommandsConfig::default())
    }

    fn names(tasks: &[&Task]) -> Vec<String> {
        tasks.iter().map(|t| t.name.clone()).collect()
    }

    #[test]
    fn standard_list_order() {
        let list = list();
        let all = list.assigned(&WorkerContext::solo());
        assert_eq!(names(&all), vec![CHECK_DEPS, CHECK_LICENSES, LINT]);
        assert_eq!(all[2].steps.len(), 3);
    }

    #[test]
    fn three_workers_get_one_task_each() {
        let list = list();
        for (index, expected) in [CHECK_DEPS, CHECK_LICENSES, LINT].iter().enumerate() {
            let ctx = WorkerContext::new("w", 3, index).unwrap();
            assert_eq!(names(&list.assigned(&ctx)), vec![expected.to_string()]);
        }
    }

    #[test]
    fn two_workers_wrap_around() {
        let list = list();
        let w0 = WorkerContext::new("w", 2, 0).unwrap();
        let w1 = WorkerContext::new("w", 2, 1).unwrap();
        assert_eq!(names(&list.assigned(&w0)), vec![CHECK_DEPS, LINT]);
        assert_eq!(names(&list.assigned(&w1)), vec![CHECK_LICENSES]);
    }

    #[test]
    fn surplus_workers_run_nothing() {
        let ctx = WorkerContext::new("w", 5, 4).unwrap();
        assert!(list().assigned(&ctx).is_empty());
    }

    #[tokio::test]
    async fn runs_all_steps_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let scripted = Arc::new(ScriptedRunner::passing());
        let runner = TaskRunner::new(scripted.clone(), dir.path(), &dir.path().join("ci.log"));

        let list = list();
        let tasks = list.assigned(&WorkerContext::solo());
        let outcomes = runner.run(&tasks).await.unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            scripted.labels(),
            vec![
                "check-deps",
                "check-licenses",
                "lint-filenames",
                "lint-manifests",
                "lint-docs"
            ]
        );
    }

    #[tokio::test]
    async fn stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let scripted = Arc::new(ScriptedRunner::failing_on("check-licenses", 2));
        let runner = TaskRunner::new(scripted.clone(), dir.path(), &dir.path().join("ci.log"));

        let list = list();
        let tasks = list.assigned(&WorkerContext::solo());
        let err = runner.run(&tasks).await.unwrap_err();

        match err {
            TaskError::StepFailed {
                task, exit_code, ..
            } => {
                assert_eq!(task, CHECK_LICENSES);
                assert_eq!(exit_code, Some(2));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(scripted.labels(), vec!["check-deps", "check-licenses"]);
    }

    #[tokio::test]
    async fn failing_lint_step_skips_remaining_lint_steps() {
        let dir = tempfile::tempdir().unwrap();
        let scripted = Arc::new(ScriptedRunner::failing_on("lint-filenames", 1));
        let runner = TaskRunner::new(scripted.clone(), dir.path(), &dir.path().join("ci.log"));

        let list = list();
        let ctx = WorkerContext::new("w", 3, 2).unwrap();
        let err = runner.run(&list.assigned(&ctx)).await.unwrap_err();

        assert!(matches!(err, TaskError::StepFailed { ref step, .. } if step == "lint-filenames"));
        assert_eq!(scripted.labels(), vec!["lint-filenames"]);
    }

    #[tokio::test]
    async fn disabled_steps_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let scripted = Arc::new(ScriptedRunner::passing());
        let runner = TaskRunner::new(scripted.clone(), dir.path(), &dir.path().join("ci.log"));

        let commands = CommandsConfig {
            lint_manifests: String::new(),
            ..Default::default()
        };
        let list = TaskList::standard(&commands);
        let ctx = WorkerContext::new("w", 3, 2).unwrap();
        let outcomes = runner.run(&list.assigned(&ctx)).await.unwrap();

        let ran: Vec<&str> = outcomes[0].steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(ran, vec!["lint-filenames", "lint-docs"]);
        assert!(outcomes[0].steps.iter().all(|s| s.exit_code == Some(0)));
        assert_eq!(scripted.labels(), vec!["lint-filenames", "lint-docs"]);
    }

    #[tokio::test]
    async fn spawn_error_is_reported_with_log() {
        let dir = tempfile::tempdir().unwrap();
        let scripted = Arc::new(ScriptedRunner::unspawnable_on("check-deps"));
        let log = dir.path().join("ci.log");
        let runner = TaskRunner::new(scripted, dir.path(), &log);

        let list = list();
        let tasks = list.assigned(&WorkerContext::solo());
        let err = runner.run(&tasks).await.unwrap_err();
        assert!(matches!(err, TaskError::Spawn { log: ref l, .. } if *l == log));
    }
}
