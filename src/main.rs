use std::process::ExitCode;
use std::sync::Arc;

use ci_shard::config::CiConfig;
use ci_shard::error::Error;
use ci_shard::exec::ShellRunner;
use ci_shard::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match CiConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("  export CI_NODE_TOTAL=<workers> CI_NODE_INDEX=<0-based index>");
            return ExitCode::FAILURE;
        }
    };

    eprintln!("ci-shard v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Worker: {}", config.worker);
    eprintln!("   Source: {}", config.source_root.display());
    eprintln!("   Results: {}", config.results_dir.display());
    eprintln!("   Logs: {}", config.log_dir.display());

    let mut orchestrator = Orchestrator::new(config.clone(), Arc::new(ShellRunner::new()));

    if config.dry_run {
        let plan = orchestrator.plan().and_then(|plan| {
            serde_json::to_string_pretty(&plan).map_err(|e| Error::Resource(e.into()))
        });
        return match plan {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("==> FAILED during {}: {e}", e.stage());
                ExitCode::FAILURE
            }
        };
    }

    let result = tokio::select! {
        result = orchestrator.run() => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    let result = match result {
        Some(result) => result,
        None => {
            let e = Error::Interrupted {
                stage: orchestrator.state().to_string(),
            };
            orchestrator.abort(&e).await;
            Err(e)
        }
    };

    match result {
        Ok(()) => {
            let summary = orchestrator.summary();
            eprintln!(
                "==> SUCCESS: {} task(s), {} test(s) passed on {}",
                summary.tasks.len(),
                summary.tests.len(),
                config.worker
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("==> FAILED during {}: {e}", e.stage());
            if let Some(log) = e.log_path() {
                eprintln!("    Log: {}", log.display());
            }
            eprintln!("    Logs: {}", config.log_dir.display());
            ExitCode::FAILURE
        }
    }
}
