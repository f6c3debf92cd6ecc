//! Shell command runner.
//!
//! Runs each command through `sh -c` with:
//! - Combined stdout/stderr redirected into a log file
//! - Positional arguments passed through `"$@"`, never spliced into the script
//! - The child killed if the run is dropped (interrupt)

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::exec::{CommandOutcome, CommandRunner, CommandSpec};

/// Name given to `$0` inside the shell script.
const SCRIPT_NAME: &str = "ci-shard";

/// Runs commands through the system shell.
#[derive(Debug, Default, Clone)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }

    fn build(spec: &CommandSpec) -> Command {
        let mut command = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&spec.command).args(&spec.args);
            c
        } else {
            let mut c = Command::new("sh");
            if spec.args.is_empty() {
                c.arg("-c").arg(&spec.command);
            } else {
                c.arg("-c")
                    .arg(format!("{} \"$@\"", spec.command))
                    .arg(SCRIPT_NAME)
                    .args(&spec.args);
            }
            c
        };

        command
            .current_dir(&spec.workdir)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, spec: &CommandSpec, log: &Path) -> std::io::Result<CommandOutcome> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .await?;
        file.write_all(format!("$ {}\n", spec.display_line()).as_bytes())
            .await?;
        file.flush().await?;

        let stdout = file.into_std().await;
        let stderr = stdout.try_clone()?;

        tracing::debug!(label = %spec.label, command = %spec.display_line(), "Spawning command");

        let start = Instant::now();
        let status = Self::build(spec)
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()?
            .wait()
            .await?;

        Ok(CommandOutcome {
            exit_code: status.code(),
            duration: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_combined_output_goes_to_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("out.log");
        let spec = CommandSpec::new("echo", "echo out; echo err >&2", dir.path());

        let outcome = ShellRunner::new().run(&spec, &log).await.unwrap();
        assert!(outcome.success());

        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.starts_with("$ echo out; echo err >&2\n"));
        assert!(content.contains("out\n"));
        assert!(content.contains("err\n"));
    }

    #[tokio::test]
    async fn test_exit_code_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("out.log");
        let spec = CommandSpec::new("fail", "exit 3", dir.path());

        let outcome = ShellRunner::new().run(&spec, &log).await.unwrap();
        assert!(!outcome.success());
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.describe(), "exit code 3");
    }

    #[tokio::test]
    async fn test_args_are_passed_positionally() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("out.log");
        let spec = CommandSpec::new("args", "printf '<%s>\\n'", dir.path())
            .with_arg("has space.js")
            .with_arg("$HOME");

        let outcome = ShellRunner::new().run(&spec, &log).await.unwrap();
        assert!(outcome.success());

        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.contains("<has space.js>"));
        assert!(content.contains("<$HOME>"));
    }

    #[tokio::test]
    async fn test_appends_across_runs_and_sees_env() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("out.log");
        let runner = ShellRunner::new();

        let first = CommandSpec::new("one", "echo one", dir.path());
        let second = CommandSpec::new("two", "echo \"$CI_SHARD_TEST_VAR\"", dir.path())
            .with_env("CI_SHARD_TEST_VAR", "two");
        runner.run(&first, &log).await.unwrap();
        runner.run(&second, &log).await.unwrap();

        let content = std::fs::read_to_string(&log).unwrap();
        let one = content.find("one\n").unwrap();
        let two = content.rfind("two\n").unwrap();
        assert!(one < two);
    }

    #[tokio::test]
    async fn test_runs_in_workdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let log = dir.path().join("out.log");
        let spec = CommandSpec::new("cat", "cat marker.txt", dir.path());

        let outcome = ShellRunner::new().run(&spec, &log).await.unwrap();
        assert!(outcome.success());
        assert!(std::fs::read_to_string(&log).unwrap().contains("here"));
    }
}
