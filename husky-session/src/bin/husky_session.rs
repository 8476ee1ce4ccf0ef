use anyhow::{Context, Result};
use clap::Parser;
use husky_session::SessionConfig;
use tracing_subscriber::EnvFilter;

/// Starts one process of a husky coordination session from a topology file.
#[derive(Parser)]
#[command(name = "husky-session")]
struct Cli {
    /// Path to the session's YAML topology file.
    #[arg(long)]
    config: String,

    /// Overrides the config file's `process_id` (useful when the same
    /// topology file is shared across every process in the session).
    #[arg(long)]
    process_id: Option<u32>,

    /// Overrides the config file's `log_level`.
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_text = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("reading config file {}", cli.config))?;
    let mut config: SessionConfig = serde_yaml::from_str(&config_text)
        .with_context(|| format!("parsing config file {}", cli.config))?;
    if let Some(process_id) = cli.process_id {
        config.process_id = process_id;
    }
    if let Some(log_level) = cli.log_level {
        config.log_level = log_level;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let validated = config.validate().context("validating session config")?;
    tracing::info!(
        process_id = validated.process_id.get(),
        bind_address = %validated.bind_address,
        num_local_threads = validated.num_local_threads,
        num_peers = validated.peers.len(),
        "starting husky session"
    );

    let context = husky_session::SessionContext::start(validated).context("bringing up session")?;
    tracing::info!(
        local_threads = ?context.local_thread_ids().map(|tid| tid.get()).collect::<Vec<_>>(),
        "session is up"
    );

    // A real application would hand the mailboxes and factory off to its
    // worker threads here. This binary exists to validate topology bring-up.
    context.shutdown();
    Ok(())
}
