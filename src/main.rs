//! Command line interface: bootstrap a configuration, follow the filter
//! topic on the configured relays, or check event files offline.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use filtersync::{
    codec::subscription_request, config::Settings, DistributionClient, Event, Verifier,
};
use tracing::{info, warn};

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "filtersync",
    author,
    version,
    about = "Follow signed filter updates over Nostr relays"
)]
struct Cli {
    /// Path to the `.env` configuration file.
    #[arg(long, default_value = ".env")]
    env: String,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Write a default `.env` if none exists.
    Init,
    /// Subscribe on all relays and print each accepted document as JSON.
    Watch,
    /// Validate event JSON files against the configured topic and signers.
    Check {
        /// Paths to JSON event files.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the subscription frame sent to relays.
    Req,
}

/// Execute the selected CLI subcommand.
async fn run(cli: Cli) -> anyhow::Result<()> {
    ensure_env_file(&cli.env)?;
    if let Commands::Init = cli.command {
        return Ok(());
    }
    let cfg = Settings::from_env(&cli.env)?;
    match cli.command {
        Commands::Init => {}
        Commands::Watch => watch(&cfg).await?,
        Commands::Check { files } => check(&cfg, &files)?,
        Commands::Req => println!("{}", subscription_request(&cfg.topic_filter(), "filtersync")),
    }
    Ok(())
}

/// Run the client until Ctrl-C.
async fn watch(cfg: &Settings) -> anyhow::Result<()> {
    let mut client = DistributionClient::new(cfg.client_config())?;
    client.start(cfg.topic_filter(), |update| {
        let line = match serde_json::to_string(&update.document) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "could not encode filter document");
                return;
            }
        };
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            warn!(error = %e, "could not write filter document");
        }
    })?;
    let mut health = client.watch_health();
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("waiting for Ctrl-C")?;
                break;
            }
            res = health.changed() => {
                if res.is_err() {
                    break;
                }
                let live = *health.borrow_and_update();
                info!(subscribed = live, relays = cfg.relays.len(), "relay health changed");
            }
        }
    }
    client.stop().await;
    Ok(())
}

/// Validate each file with no prior accepted state.
fn check(cfg: &Settings, files: &[PathBuf]) -> anyhow::Result<()> {
    let verifier = Verifier::new(cfg.topic_filter());
    let mut rejected = 0;
    for file in files {
        let data = fs::read_to_string(file)
            .with_context(|| format!("reading {}", file.display()))?;
        let ev: Event = serde_json::from_str(&data)
            .with_context(|| format!("parsing {}", file.display()))?;
        match verifier.validate(&ev, None) {
            Ok(doc) => println!("{}: accepted version {}", file.display(), doc.version),
            Err(reason) => {
                rejected += 1;
                println!("{}: rejected ({})", file.display(), reason.as_str());
            }
        }
    }
    if rejected > 0 {
        bail!("{rejected} event(s) rejected");
    }
    Ok(())
}

/// Create a default `.env` file if one is not already present at `path`.
fn ensure_env_file(path: &str) -> anyhow::Result<()> {
    let env_path = Path::new(path);
    if env_path.exists() {
        return Ok(());
    }
    if let Some(parent) = env_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(env_path, filtersync::config::default_env_contents())?;
    Ok(())
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    let cli = Cli::parse();
    run(cli).await
}
