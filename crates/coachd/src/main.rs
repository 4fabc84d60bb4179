//! coachd - interview coaching orchestration daemon
//!
//! Loads configuration, wires providers, gateway, storage, orchestrator and
//! the lifecycle sweeper, then runs until Ctrl-C. Transports (HTTP,
//! WebSocket) embed the library instead of talking to this binary.

use anyhow::{Context, Result};
use clap::Parser;
use coach_common::CoachConfig;
use coachd::{
    AiGateway, BroadcastNotifier, Clock, InMemoryStorage, SessionLifecycleManager,
    SessionOrchestrator, SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};

#[derive(Parser)]
#[command(name = "coachd")]
#[command(about = "Interview coaching orchestration daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (overrides $COACH_CONFIG and /etc/coach/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single lifecycle sweep and exit
    #[arg(long)]
    sweep_once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging comes up before the config so config fallbacks are reported;
    // the configured level is applied once it is known
    let rust_log = std::env::var("RUST_LOG").ok();
    let (filter, filter_handle) =
        reload::Layer::new(log_filter(rust_log.as_deref(), DEFAULT_LOG_LEVEL)?);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .context("failed to initialize logging")?;

    let config = CoachConfig::load(cli.config.as_deref());
    filter_handle
        .reload(log_filter(rust_log.as_deref(), &config.logging.level)?)
        .context("failed to apply configured log level")?;

    info!("coachd v{} starting", env!("CARGO_PKG_VERSION"));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let gateway = Arc::new(AiGateway::from_config(&config, clock.clone()));
    let providers = gateway.provider_names();
    if providers.is_empty() {
        warn!("No providers configured, all content will come from templates");
    } else {
        info!("Providers in priority order: {}", providers.join(", "));
    }

    let storage = Arc::new(InMemoryStorage::new());
    let notifier = Arc::new(BroadcastNotifier::default());

    let orchestrator = Arc::new(SessionOrchestrator::new(
        storage.clone(),
        gateway.clone(),
        notifier.clone(),
        clock.clone(),
        config.session.clone(),
    ));

    let lifecycle = Arc::new(
        SessionLifecycleManager::new(
            storage.clone(),
            clock.clone(),
            notifier.clone(),
            config.lifecycle.clone(),
        )
        .with_observer(orchestrator.clone()),
    );

    if cli.sweep_once {
        let report = lifecycle.run_sweep().await.context("lifecycle sweep failed")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to encode sweep report")?
        );
        return Ok(());
    }

    let sweeper = lifecycle.clone().spawn();
    info!(
        interval_secs = config.lifecycle.sweep_interval_secs,
        "coachd ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutting down gracefully");
    sweeper.abort();

    let stats = gateway.stats().await;
    info!(
        cache_hits = stats.cache_hits,
        cache_misses = stats.cache_misses,
        tracked_sessions = orchestrator.tracked_sessions(),
        "gateway totals"
    );

    Ok(())
}

const DEFAULT_LOG_LEVEL: &str = "info";

/// RUST_LOG wins over the configured level
fn log_filter(rust_log: Option<&str>, configured: &str) -> Result<EnvFilter> {
    let directives = rust_log
        .filter(|d| !d.trim().is_empty())
        .unwrap_or(configured);
    EnvFilter::try_new(directives).with_context(|| format!("invalid log filter {:?}", directives))
}
