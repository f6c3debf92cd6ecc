//! Configuration types, read from the CI environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::context::WorkerContext;
use crate::discovery::DiscoveryOptions;
use crate::error::ConfigError;
use crate::logs::LogOwner;

/// Environment variable names.
pub mod vars {
    pub const NODE_TOTAL: &str = "CI_NODE_TOTAL";
    pub const NODE_INDEX: &str = "CI_NODE_INDEX";
    pub const WORKER_ID: &str = "CI_WORKER_ID";
    pub const SOURCE_ROOT: &str = "CI_SOURCE_ROOT";
    pub const RESULTS_DIR: &str = "CI_RESULTS_DIR";
    pub const LOG_DIR: &str = "CI_LOG_DIR";
    pub const LOG_OWNER: &str = "CI_LOG_OWNER";
    pub const HEARTBEAT_SECS: &str = "CI_HEARTBEAT_SECS";
    pub const TEST_EXTENSION: &str = "CI_TEST_EXTENSION";
    pub const TEST_INCLUDE: &str = "CI_TEST_INCLUDE";
    pub const DRY_RUN: &str = "CI_DRY_RUN";

    pub const CMD_VERSION_SWITCH: &str = "CI_CMD_VERSION_SWITCH";
    pub const CMD_DEPS_CLEAN: &str = "CI_CMD_DEPS_CLEAN";
    pub const CMD_DEPS_INSTALL: &str = "CI_CMD_DEPS_INSTALL";
    pub const CMD_CHECK_DEPS: &str = "CI_CMD_CHECK_DEPS";
    pub const CMD_CHECK_LICENSES: &str = "CI_CMD_CHECK_LICENSES";
    pub const CMD_LINT_FILENAMES: &str = "CI_CMD_LINT_FILENAMES";
    pub const CMD_LINT_MANIFESTS: &str = "CI_CMD_LINT_MANIFESTS";
    pub const CMD_LINT_DOCS: &str = "CI_CMD_LINT_DOCS";
    pub const CMD_TEST: &str = "CI_CMD_TEST";
}

/// External commands run by the worker. An empty command disables its step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandsConfig {
    /// Switch to the pinned runtime version.
    pub version_switch: String,
    /// Remove installed dependencies.
    pub deps_clean: String,
    /// Install dependencies.
    pub deps_install: String,
    /// Dependency freshness check.
    pub check_deps: String,
    /// License check.
    pub check_licenses: String,
    /// Lint: file names.
    pub lint_filenames: String,
    /// Lint: manifest files.
    pub lint_manifests: String,
    /// Lint: documentation.
    pub lint_docs: String,
    /// Single-test command; the test file is appended as its last argument.
    pub test: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            version_switch: "make use-version".to_string(),
            deps_clean: "make clean-deps".to_string(),
            deps_install: "make install".to_string(),
            check_deps: "make check-deps".to_string(),
            check_licenses: "make check-licenses".to_string(),
            lint_filenames: "make lint-filenames".to_string(),
            lint_manifests: "make lint-manifests".to_string(),
            lint_docs: "make lint-docs".to_string(),
            test: "node".to_string(),
        }
    }
}

/// Full worker configuration.
#[derive(Debug, Clone)]
pub struct CiConfig {
    /// This worker's identity among the parallel workers.
    pub worker: WorkerContext,
    /// Root searched for tests; commands run here.
    pub source_root: PathBuf,
    /// Directory for result files and the worker summary.
    pub results_dir: PathBuf,
    /// Directory for the aggregate log and per-test logs.
    pub log_dir: PathBuf,
    /// Owner applied to created log files.
    pub log_owner: Option<LogOwner>,
    /// Heartbeat interval.
    pub heartbeat_interval: Duration,
    /// Test discovery filters.
    pub discovery: DiscoveryOptions,
    /// External commands.
    pub commands: CommandsConfig,
    /// Print the plan and exit without running anything.
    pub dry_run: bool,
}

impl CiConfig {
    /// Default heartbeat interval.
    pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(60);
    /// Default test file extension.
    pub const DEFAULT_EXTENSION: &'static str = "js";
    /// Default inclusion pattern, matched against the whole path.
    pub const DEFAULT_INCLUDE: &'static str = ".*/test/.*";

    /// Minimal configuration for a worker rooted at `source_root`, with
    /// results and logs under `<root>/reports`.
    pub fn new(worker: WorkerContext, source_root: PathBuf) -> Result<Self, ConfigError> {
        let results_dir = source_root.join("reports");
        let log_dir = results_dir.join("logs");
        Ok(Self {
            worker,
            source_root,
            results_dir,
            log_dir,
            log_owner: None,
            heartbeat_interval: Self::DEFAULT_HEARTBEAT,
            discovery: DiscoveryOptions::new(Self::DEFAULT_EXTENSION, Self::DEFAULT_INCLUDE)?,
            commands: CommandsConfig::default(),
            dry_run: false,
        })
    }

    /// Build configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());

        let total = required_int(&get, vars::NODE_TOTAL)?;
        if total <= 0 {
            return Err(ConfigError::InvalidWorkerCount { total });
        }
        let index = required_int(&get, vars::NODE_INDEX)?;
        if index < 0 {
            return Err(ConfigError::InvalidValue {
                key: vars::NODE_INDEX.to_string(),
                message: format!("must not be negative, got {index}"),
            });
        }
        let (total, index) = (total as usize, index as usize);
        let id = get(vars::WORKER_ID)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("worker-{index}"));
        let worker = WorkerContext::new(id, total, index)?;

        let source_root = match get(vars::SOURCE_ROOT).filter(|s| !s.is_empty()) {
            Some(root) => absolute(vars::SOURCE_ROOT, Path::new(&root))?,
            None => std::env::current_dir().map_err(|e| ConfigError::InvalidValue {
                key: vars::SOURCE_ROOT.to_string(),
                message: format!("cannot determine current directory: {e}"),
            })?,
        };

        let mut config = Self::new(worker, source_root)?;

        if let Some(dir) = get(vars::RESULTS_DIR).filter(|s| !s.is_empty()) {
            config.results_dir = absolute(vars::RESULTS_DIR, Path::new(&dir))?;
            config.log_dir = config.results_dir.join("logs");
        }
        if let Some(dir) = get(vars::LOG_DIR).filter(|s| !s.is_empty()) {
            config.log_dir = absolute(vars::LOG_DIR, Path::new(&dir))?;
        }

        if let Some(owner) = get(vars::LOG_OWNER).filter(|s| !s.is_empty()) {
            config.log_owner = Some(owner.parse().map_err(|message| ConfigError::InvalidValue {
                key: vars::LOG_OWNER.to_string(),
                message,
            })?);
        }

        if let Some(secs) = get(vars::HEARTBEAT_SECS).filter(|s| !s.is_empty()) {
            let secs: u64 = secs.parse().map_err(|e| ConfigError::InvalidValue {
                key: vars::HEARTBEAT_SECS.to_string(),
                message: format!("{e}"),
            })?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: vars::HEARTBEAT_SECS.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
            config.heartbeat_interval = Duration::from_secs(secs);
        }

        let extension = get(vars::TEST_EXTENSION)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_EXTENSION.to_string());
        let include = get(vars::TEST_INCLUDE)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_INCLUDE.to_string());
        config.discovery = DiscoveryOptions::new(&extension, &include)?;

        config.dry_run = get(vars::DRY_RUN).is_some_and(|v| is_truthy(&v));

        // Command overrides keep empty values: an empty command disables the step.
        let commands = &mut config.commands;
        for (key, slot) in [
            (vars::CMD_VERSION_SWITCH, &mut commands.version_switch),
            (vars::CMD_DEPS_CLEAN, &mut commands.deps_clean),
            (vars::CMD_DEPS_INSTALL, &mut commands.deps_install),
            (vars::CMD_CHECK_DEPS, &mut commands.check_deps),
            (vars::CMD_CHECK_LICENSES, &mut commands.check_licenses),
            (vars::CMD_LINT_FILENAMES, &mut commands.lint_filenames),
            (vars::CMD_LINT_MANIFESTS, &mut commands.lint_manifests),
            (vars::CMD_LINT_DOCS, &mut commands.lint_docs),
            (vars::CMD_TEST, &mut commands.test),
        ] {
            if let Some(value) = get(key) {
                *slot = value;
            }
        }
        if config.commands.test.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: vars::CMD_TEST.to_string(),
                message: "the test command cannot be empty".to_string(),
            });
        }

        Ok(config)
    }
}

fn required_int<F>(get: &F, key: &str) -> Result<i64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = get(key)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    raw.parse().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?} is not an integer: {e}"),
    })
}

fn absolute(key: &str, path: &Path) -> Result<PathBuf, ConfigError> {
    std::path::absolute(path).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("cannot resolve {}: {e}", path.display()),
    })
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
