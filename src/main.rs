use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::{Parser, Subcommand};
use rw_auth::CredentialKind;
use rw_monitor::{Monitor, MonitorConfig, open_settings, token_chain};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Publishes who is online on a Minecraft Realm", long_about = None)]
struct Cli {
    /// Config file, defaults to the platform config directory
    #[arg(long, short, global = true, env = "REALM_WATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in with a Microsoft account
    Login,
    /// Poll the realm once and publish the status
    Run,
    /// Poll the realm on a fixed interval until interrupted
    Watch {
        /// Seconds between polls
        #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(10..))]
        interval: u64,
    },
    /// Show the cached credentials without touching the network
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config).await?;

    match cli.cmd {
        Command::Login => login(&config).await,
        Command::Run => {
            let mut monitor = Monitor::from_config(&config).await?;
            let report = monitor.run_once().await?;
            println!(
                "{}: {} online{}",
                report.world,
                report.online.len(),
                if report.online.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", report.online.join(", "))
                }
            );
            if let Some(url) = report.backup_url {
                println!("Latest backup: {}", url);
            }
            Ok(())
        }
        Command::Watch { interval } => watch(&config, Duration::from_secs(interval)).await,
        Command::Status => status(&config).await,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .init();
}

async fn load_config(path: Option<PathBuf>) -> Result<MonitorConfig> {
    let path = match path {
        Some(path) => path,
        None => MonitorConfig::default_path()?,
    };

    let mut config = MonitorConfig::load(&path)
        .await
        .with_context(|| format!("Failed to load {}", path.display()))?;
    config.apply_env();
    config.validate()?;
    Ok(config)
}

async fn login(config: &MonitorConfig) -> Result<()> {
    let settings = open_settings(config).await?;
    let mut chain = token_chain(config, settings)?;

    let url = chain.begin_login(None).await?;
    println!("Open this URL in a browser and sign in:\n\n{}\n", url);
    println!("Then paste the URL you were redirected to (or just the code):");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let input = lines
        .next_line()
        .await
        .context("Failed to read from stdin")?
        .unwrap_or_default();
    let input = input.trim();
    if input.is_empty() {
        bail!("No authorization code given");
    }

    let code = if input.starts_with("http://") || input.starts_with("https://") {
        chain.client().parse_redirect(input, None)?
    } else {
        input.to_string()
    };

    chain.complete_login(&code).await?;
    chain
        .get_valid(CredentialKind::Minecraft)
        .await
        .context("Signed in, but the Minecraft token could not be obtained")?;

    println!("Signed in.");
    Ok(())
}

async fn watch(config: &MonitorConfig, interval: Duration) -> Result<()> {
    let mut monitor = Monitor::from_config(config).await?;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Polling every {}s", interval.as_secs());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match monitor.run_once().await {
                    Ok(report) => info!("{}: {} online", report.world, report.online.len()),
                    Err(e) if e.requires_login() => {
                        error!("Stopping: {}", e);
                        bail!("Sign in again with `realm-watch login`");
                    }
                    Err(e) => warn!("Run failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                return Ok(());
            }
        }
    }
}

async fn status(config: &MonitorConfig) -> Result<()> {
    let settings = open_settings(config).await?;
    let chain = token_chain(config, settings)?;

    for kind in CredentialKind::ALL {
        let line = match chain.store().get(kind).await? {
            None => "missing".to_string(),
            Some(record) => {
                let state = if record.is_valid() { "fresh" } else { "stale" };
                match record.expires_at {
                    Some(at) => format!(
                        "{} (expires {})",
                        state,
                        at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                    ),
                    None => state.to_string(),
                }
            }
        };
        println!("{:<16} {}", kind.to_string(), line);
    }
    Ok(())
}
