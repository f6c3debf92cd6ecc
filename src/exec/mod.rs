//! External command execution.
//!
//! Every environment step, task step and test goes through [`CommandRunner`],
//! so the orchestration can be exercised without spawning real processes.

pub mod shell;
#[cfg(test)]
pub mod testing;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

pub use shell::ShellRunner;

/// A command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Short label used in logs ("deps-install", "lint-docs", a test path).
    pub label: String,
    /// Shell command line.
    pub command: String,
    /// Extra positional arguments appended to the command, shell-quoted.
    pub args: Vec<String>,
    /// Working directory.
    pub workdir: PathBuf,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(label: impl Into<String>, command: impl Into<String>, workdir: &Path) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
            args: Vec::new(),
            workdir: workdir.to_path_buf(),
            env: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Command line as it would be typed, for log headers.
    pub fn display_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// Outcome of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Exit code, `None` when killed by a signal.
    pub exit_code: Option<i32>,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Human-readable status, e.g. "exit code 2" or "terminated by signal".
    pub fn describe(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs commands, appending combined stdout/stderr to a log file.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `spec` to completion. The log file is created if missing and
    /// appended to otherwise.
    async fn run(&self, spec: &CommandSpec, log: &Path) -> std::io::Result<CommandOutcome>;
}
