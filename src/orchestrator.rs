//! Orchestrator: the worker's main sequence.
//!
//! `Init → HeartbeatStarted → EnvironmentReady → TasksRunning →
//! TestsAllocated → TestsRunning → Success`, with `Failed` reachable from
//! every non-terminal state. Cleanup (heartbeat stop, summary) runs on both
//! terminal paths.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CiConfig;
use crate::context::WorkerContext;
use crate::discovery::{self, TestFile};
use crate::error::{Error, Result};
use crate::exec::CommandRunner;
use crate::logs::{self, LogDir};
use crate::report::{self, WorkerSummary};
use crate::shard;
use crate::worker::{
    EnvironmentSetup, Heartbeat, HeartbeatHandle, Task, TaskList, TaskRunner, TestRunner,
    environment,
};

/// State of a worker run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Init,
    HeartbeatStarted,
    EnvironmentReady,
    TasksRunning,
    TestsAllocated,
    TestsRunning,
    Success,
    Failed,
}

impl OrchestratorState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: OrchestratorState) -> bool {
        use OrchestratorState::*;

        if target == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, target),
            (Init, HeartbeatStarted)
                | (HeartbeatStarted, EnvironmentReady)
                | (EnvironmentReady, TasksRunning)
                | (TasksRunning, TestsAllocated)
                | (TestsAllocated, TestsRunning)
                | (TestsRunning, Success)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::HeartbeatStarted => "heartbeat_started",
            Self::EnvironmentReady => "environment_ready",
            Self::TasksRunning => "tasks_running",
            Self::TestsAllocated => "tests_allocated",
            Self::TestsRunning => "tests_running",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A state transition event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: OrchestratorState,
    pub to: OrchestratorState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// What a worker would run, without running it.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub worker: WorkerContext,
    pub tasks: Vec<String>,
    pub tests: Vec<PathBuf>,
}

/// Drives one worker run from start to a terminal state.
pub struct Orchestrator {
    config: CiConfig,
    runner: Arc<dyn CommandRunner>,
    tasks: TaskList,
    logs: LogDir,
    heartbeat: Option<HeartbeatHandle>,
    summary: WorkerSummary,
}

impl Orchestrator {
    pub fn new(config: CiConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let tasks = TaskList::standard(&config.commands);
        let logs = LogDir::new(config.log_dir.clone(), config.log_owner);
        let summary = WorkerSummary::new(config.worker.clone());
        Self {
            config,
            runner,
            tasks,
            logs,
            heartbeat: None,
            summary,
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.summary.state
    }

    pub fn summary(&self) -> &WorkerSummary {
        &self.summary
    }

    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat.as_ref().is_some_and(HeartbeatHandle::is_running)
    }

    /// Discover and shard tests for this worker.
    pub fn allocate_tests(&self) -> Result<Vec<TestFile>> {
        let found = discovery::discover(&self.config.source_root, &self.config.discovery)?;
        let worker = &self.config.worker;
        shard::shard(found, worker.total(), worker.index()).map_err(Error::from)
    }

    /// The tasks and tests this worker would run.
    pub fn plan(&self) -> Result<ExecutionPlan> {
        let tests = self.allocate_tests()?;
        Ok(ExecutionPlan {
            worker: self.config.worker.clone(),
            tasks: self
                .tasks
                .assigned(&self.config.worker)
                .iter()
                .map(|t| t.name.clone())
                .collect(),
            tests: tests.iter().map(|t| t.relative().to_path_buf()).collect(),
        })
    }

    /// Run the full sequence. Cleanup runs whether the sequence succeeds or
    /// fails; the returned error is the first failure.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.execute().await;
        match &result {
            Ok(()) => self.transition(OrchestratorState::Success, None),
            Err(e) => self.fail(e),
        }
        self.finish().await;
        result
    }

    /// Mark the run failed from outside the main sequence (interrupt) and
    /// clean up.
    pub async fn abort(&mut self, error: &Error) {
        self.fail(error);
        self.finish().await;
    }

    /// Stop the heartbeat. Safe to call any number of times.
    pub fn cleanup(&mut self) {
        if let Some(mut heartbeat) = self.heartbeat.take() {
            heartbeat.stop();
        }
    }

    async fn execute(&mut self) -> Result<()> {
        let worker = self.config.worker.clone();
        eprintln!("==> Worker {worker}");

        logs::ensure_dir(&self.config.results_dir).await?;
        self.logs.ensure().await?;
        self.heartbeat =
            Some(Heartbeat::new(worker.id(), self.config.heartbeat_interval).start());
        self.transition(OrchestratorState::HeartbeatStarted, None);

        eprintln!("==> Preparing environment");
        let setup = EnvironmentSetup::new(
            Arc::clone(&self.runner),
            &self.config.source_root,
            &self.logs.aggregate(),
        );
        let ran = setup
            .prepare(&environment::steps(&self.config.commands))
            .await?;
        self.transition(
            OrchestratorState::EnvironmentReady,
            Some(format!("{} step(s)", ran.len())),
        );

        let assigned: Vec<Task> = self.tasks.assigned(&worker).into_iter().cloned().collect();
        self.transition(
            OrchestratorState::TasksRunning,
            Some(format!("{} task(s)", assigned.len())),
        );
        if assigned.is_empty() {
            eprintln!("==> No pre-test tasks assigned to this worker");
        }
        let task_runner = TaskRunner::new(
            Arc::clone(&self.runner),
            &self.config.source_root,
            &self.logs.aggregate(),
        );
        for task in assigned {
            eprintln!("==> Running task {}", task.name);
            let outcomes = task_runner.run(&[&task]).await?;
            self.summary.tasks.extend(outcomes);
        }

        let shard = self.allocate_tests()?;
        self.summary.assigned_tests = shard.iter().map(|t| t.relative().to_path_buf()).collect();
        self.transition(
            OrchestratorState::TestsAllocated,
            Some(format!("{} test(s)", shard.len())),
        );

        eprintln!("==> Running {} test(s)", shard.len());
        self.transition(OrchestratorState::TestsRunning, None);
        let test_runner = TestRunner::new(
            Arc::clone(&self.runner),
            worker,
            &self.config.source_root,
            &self.config.results_dir,
            &self.config.commands.test,
        );
        let outcomes = &mut self.summary.tests;
        test_runner
            .run(&shard, &self.logs, |outcome| outcomes.push(outcome.clone()))
            .await?;

        Ok(())
    }

    fn fail(&mut self, error: &Error) {
        self.summary.failure = Some(error.to_string());
        self.transition(
            OrchestratorState::Failed,
            Some(format!("{} failed", error.stage())),
        );
    }

    async fn finish(&mut self) {
        self.cleanup();
        self.summary.finished_at = Some(Utc::now());

        let path = report::summary_path(&self.config.results_dir, &self.config.worker);
        if let Err(e) = self.summary.write(&path).await {
            tracing::warn!(error = %e, "Could not write worker summary");
        }
    }

    fn transition(&mut self, to: OrchestratorState, reason: Option<String>) {
        let from = self.summary.state;
        if !from.can_transition_to(to) {
            tracing::warn!(%from, %to, "Ignoring invalid state transition");
            return;
        }
        tracing::debug!(%from, %to, reason = ?reason, "State transition");
        self.summary.transitions.push(StateTransition {
            from,
            to,
            timestamp: Utc::now(),
            reason,
        });
        self.summary.state = to;
    }
}
