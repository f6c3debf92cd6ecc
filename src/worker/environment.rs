//! Runtime environment setup: version switch, dependency reset, install.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::CommandsConfig;
use crate::error::EnvironmentError;
use crate::exec::{CommandRunner, CommandSpec};
use crate::worker::tasks::Step;

/// Ordered environment steps.
pub fn steps(commands: &CommandsConfig) -> Vec<Step> {
    vec![
        Step::new("version-switch", &commands.version_switch),
        Step::new("deps-clean", &commands.deps_clean),
        Step::new("deps-install", &commands.deps_install),
    ]
}

/// Prepares the runtime environment before any task runs.
pub struct EnvironmentSetup {
    runner: Arc<dyn CommandRunner>,
    workdir: PathBuf,
    log: PathBuf,
}

impl EnvironmentSetup {
    pub fn new(runner: Arc<dyn CommandRunner>, workdir: &Path, log: &Path) -> Self {
        Self {
            runner,
            workdir: workdir.to_path_buf(),
            log: log.to_path_buf(),
        }
    }

    /// Run every enabled step in order, stopping at the first failure.
    /// Returns the names of the steps that ran.
    pub async fn prepare(&self, steps: &[Step]) -> Result<Vec<String>, EnvironmentError> {
        let mut ran = Vec::new();
        for step in steps.iter().filter(|s| s.is_enabled()) {
            tracing::info!(step = %step.name, "Preparing environment");
            let spec = CommandSpec::new(&step.name, &step.command, &self.workdir);
            let outcome =
                self.runner
                    .run(&spec, &self.log)
                    .await
                    .map_err(|source| EnvironmentError::Spawn {
                        step: step.name.clone(),
                        log: self.log.clone(),
                        source,
                    })?;
            if !outcome.success() {
                return Err(EnvironmentError::StepFailed {
                    step: step.name.clone(),
                    exit_code: outcome.exit_code,
                    log: self.log.clone(),
                });
            }
            ran.push(step.name.clone());
        }
        Ok(ran)
    }
}
