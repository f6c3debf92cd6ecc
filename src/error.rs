//! Error types for the CI worker.

use std::path::PathBuf;

/// Top-level error type for a worker run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Test failure: {0}")]
    Test(#[from] TestFailure),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Interrupted while {stage}")]
    Interrupted { stage: String },
}

impl Error {
    /// Name of the stage that produced this error, for the final status line.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Config(_) => "configuration",
            Self::Environment(_) => "environment setup",
            Self::Task(_) => "pre-test tasks",
            Self::Test(_) => "tests",
            Self::Resource(_) => "resources",
            Self::Interrupted { .. } => "interrupt",
        }
    }

    /// Log file a human should open to investigate, if there is one.
    pub fn log_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Environment(EnvironmentError::StepFailed { log, .. })
            | Self::Environment(EnvironmentError::Spawn { log, .. })
            | Self::Task(TaskError::StepFailed { log, .. })
            | Self::Task(TaskError::Spawn { log, .. }) => Some(log),
            Self::Test(failure) => Some(&failure.log),
            _ => None,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid worker count {total}: at least one worker is required")]
    InvalidWorkerCount { total: i64 },

    #[error("Worker index {index} is out of range for {total} workers")]
    IndexOutOfRange { index: usize, total: usize },

    #[error("Invalid test inclusion pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Runtime environment setup errors (version switch, dependency reset, install).
#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("Environment step {step} exited with {exit_code:?}, see {}", .log.display())]
    StepFailed {
        step: String,
        exit_code: Option<i32>,
        log: PathBuf,
    },

    #[error("Environment step {step} could not be started: {source}")]
    Spawn {
        step: String,
        log: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Pre-test task errors.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task {task} failed at step `{step}` with {exit_code:?}, see {}", .log.display())]
    StepFailed {
        task: String,
        step: String,
        exit_code: Option<i32>,
        log: PathBuf,
    },

    #[error("Task {task} step `{step}` could not be started: {source}")]
    Spawn {
        task: String,
        step: String,
        log: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single test's failure. Carries the test path and its log.
#[derive(Debug, thiserror::Error)]
#[error("{} failed ({}), see {}", .test.display(), .reason, .log.display())]
pub struct TestFailure {
    /// Absolute path of the failing test file.
    pub test: PathBuf,
    /// Per-test log holding the test's combined output.
    pub log: PathBuf,
    /// Exit code, when the test ran and exited normally.
    pub exit_code: Option<i32>,
    /// Short human-readable reason.
    pub reason: String,
}

/// Filesystem resource errors (directories, log files, reports).
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("Failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create log file {}: {source}", .path.display())]
    CreateLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk {}: {reason}", .path.display())]
    Walk { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for the worker.
pub type Result<T> = std::result::Result<T, Error>;
