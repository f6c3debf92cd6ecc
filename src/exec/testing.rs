//! Scripted command runner for unit tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::exec::{CommandOutcome, CommandRunner, CommandSpec};

/// Records every command it is asked to run and answers from a script
/// keyed by label. Unscripted labels pass.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    exit_codes: HashMap<String, i32>,
    unspawnable: Vec<String>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn passing() -> Self {
        Self::default()
    }

    pub fn failing_on(label: &str, code: i32) -> Self {
        Self::default().with_exit(label, code)
    }

    pub fn unspawnable_on(label: &str) -> Self {
        Self {
            unspawnable: vec![label.to_string()],
            ..Default::default()
        }
    }

    pub fn with_exit(mut self, label: &str, code: i32) -> Self {
        self.exit_codes.insert(label.to_string(), code);
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.label).collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec, log: &Path) -> std::io::Result<CommandOutcome> {
        self.calls.lock().unwrap().push(spec.clone());
        if self.unspawnable.contains(&spec.label) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: command not found", spec.command),
            ));
        }

        let line = format!("$ {}\n", spec.display_line());
        let mut existing = tokio::fs::read(log).await.unwrap_or_default();
        existing.extend_from_slice(line.as_bytes());
        tokio::fs::write(log, existing).await?;

        Ok(CommandOutcome {
            exit_code: Some(self.exit_codes.get(&spec.label).copied().unwrap_or(0)),
            duration: Duration::from_millis(5),
        })
    }
}
