//! # Courier: paced multi-channel message dispatcher
//!
//! Polls a remote queue of outbound messages and sends them through every
//! connected channel at a human pace, recording deliveries in a ledger so a
//! restart never resends.
//!
//! Usage:
//!   courier                              # ~/.courier/config.toml
//!   courier --config ./courier.toml      # Custom config
//!   courier --ledger /var/lib/courier/sent.json
//!   courier --check                      # Validate config + ledger and exit
//!   courier --json                       # JSON log lines

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use courier_channels::{HttpChannelDirectory, HttpDeliverySink, HttpQueueSource, HttpSendGateway};
use courier_core::CourierConfig;
use courier_scheduler::{DispatchEngine, Ledger};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "courier",
    version,
    about = "📨 Courier: paced multi-channel message dispatcher"
)]
struct Cli {
    /// Config file (default: ~/.courier/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Ledger path, overrides `[ledger] path`
    #[arg(long)]
    ledger: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json: bool,

    /// Validate config, load the ledger, print a summary and exit
    #[arg(long)]
    check: bool,
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn init_logging(cli: &Cli) {
    let filter = if cli.verbose {
        "courier=debug,courier_scheduler=debug,courier_channels=debug"
    } else {
        "courier=info,courier_scheduler=info,courier_channels=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if cli.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> Result<CourierConfig> {
    let config = match &cli.config {
        Some(path) => {
            let path = expand_path(path);
            CourierConfig::load_from(&path)
                .with_context(|| format!("loading {}", path.display()))?
        }
        None => CourierConfig::load().context("loading default config")?,
    };
    config.validate()?;
    Ok(config)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("⚠️ Ctrl+C handler unavailable: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("⚠️ SIGTERM handler unavailable: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = load_config(&cli)?;
    let ledger_path = expand_path(cli.ledger.as_deref().unwrap_or(&config.ledger.path));
    let ledger = Arc::new(
        Ledger::open(&config.ledger, &ledger_path)
            .with_context(|| format!("opening ledger {}", ledger_path.display()))?,
    );

    if cli.check {
        println!("📨 Courier: configuration check\n");
        println!("   Queue:      {}", config.queue.url);
        println!("   Directory:  {}", config.directory.url);
        println!("   Send:       {}<channel>", config.send.base_url);
        println!("   Sink:       {}", config.sink.url);
        println!(
            "   Ledger:     {} ({:?}, {} delivered)",
            ledger_path.display(),
            config.ledger.backend,
            ledger.len()
        );
        println!(
            "   Pacing:     {} msgs/channel, pace {}–{}ms, retries {}",
            config.pacing.max_messages_per_channel,
            config.pacing.message_pace_min_ms,
            config.pacing.message_pace_max_ms,
            config.retry.max_retries
        );
        println!("\n✅ Configuration OK");
        return Ok(());
    }

    let client = reqwest::Client::builder()
        .user_agent(concat!("courier/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building HTTP client")?;

    let source = Arc::new(HttpQueueSource::new(&config.queue, client.clone()));
    let directory = Arc::new(HttpChannelDirectory::new(&config.directory, client.clone()));
    let gateway = Arc::new(HttpSendGateway::new(&config.send, client.clone()));
    let sink = Arc::new(HttpDeliverySink::new(&config.sink, client));

    let engine = Arc::new(DispatchEngine::new(
        config, ledger, source, directory, gateway, sink,
    ));

    tokio::select! {
        _ = engine.run() => {
            tracing::warn!("⚠️ Dispatch engine stopped unexpectedly");
        }
        _ = shutdown_signal() => {
            tracing::info!("🛑 Shutdown requested");
        }
    }

    let stats = engine.stats();
    tracing::info!(
        "📊 Final stats: {}",
        serde_json::to_string(&stats).unwrap_or_default()
    );
    Ok(())
}
