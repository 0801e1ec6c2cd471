use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tg_core::orchestrator::Orchestrator;
use tg_core::remote_state::BackendRegistry;
use tg_core::runtime::NoopRunCommand;
use tg_core::serializer;
use tg_core::session::ParsingSession;

/// tg-core - configuration resolution core demo CLI.
///
/// Parses one unit file through the full five-stage pipeline and prints
/// its resolved, serialized configuration as JSON. The CLI surface proper
/// (plan/apply/run-all orchestration across a stack) lives outside this
/// crate; this binary exists to exercise the core end to end.
#[derive(Parser)]
#[command(name = "tg-core", version, about, long_about = None)]
struct Cli {
    /// Path to the unit configuration file to resolve.
    config: PathBuf,

    /// Working directory used for cache-key scoping and relative paths.
    #[arg(short, long, default_value = ".")]
    working_dir: String,

    /// Subcommand name to resolve under (affects mock-output allowlisting).
    #[arg(short, long, default_value = "plan")]
    command: String,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let noop_runtime = Arc::new(NoopRunCommand);
    let session = Arc::new(ParsingSession::new(
        cli.working_dir.clone(),
        cli.command.clone(),
        noop_runtime.clone(),
        noop_runtime,
        Arc::new(tg_core::runtime::NoopCredentials),
    ));

    let orchestrator = Orchestrator::new(session, Arc::new(BackendRegistry::new()));
    let cfg = orchestrator
        .parse(&cli.config)
        .await
        .with_context(|| format!("resolving {}", cli.config.display()))?;

    let serialized = serializer::serialize(&cfg);
    let json = tg_core::value::to_dyn_json(&serialized);
    println!("{}", serde_json::to_string_pretty(&json)?);

    Ok(())
}
