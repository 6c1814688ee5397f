use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use position_ledger::{FileStore, SignalStore};
use tokio::sync::mpsc;
use tokio::time;

mod commands;
mod config;
mod lifecycle;
mod notifier;
mod providers;
mod scanner;

use commands::{spawn_stdin_listener, Command};
use config::AgentConfig;
use lifecycle::PositionLifecycle;
use notifier::WebhookNotifier;
use providers::YahooChartClient;
use scanner::MarketScanner;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    // Panic hook: log panic info before crashing
    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting Trend Sentinel signal agent");

    // 2. Load configuration
    let config = AgentConfig::from_env()?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Scan interval: {} seconds", config.scan_interval_seconds);
    tracing::info!(
        "  Hard-stop interval: {} seconds",
        config.hard_stop_interval_seconds
    );
    tracing::info!("  Cooldown: {} hours", config.cooldown_hours);
    tracing::info!(
        "  Session: {}-{} {} (gate {})",
        config.session_start,
        config.session_end,
        config.session_timezone,
        if config.session_gate_enabled {
            "on"
        } else {
            "off"
        }
    );
    tracing::info!("  Data dir: {}", config.data_dir);

    // 3. Open the store and seed it on first run
    let store: Arc<dyn SignalStore> = Arc::new(FileStore::new(&config.data_dir)?);
    if store.watchlist()?.is_empty() {
        let seeded = store.set_watchlist(&config.default_watchlist)?;
        tracing::info!("Seeded watchlist: {}", seeded.join(", "));
    }
    if store.strategy_params()?.is_none() {
        store.save_strategy_params(&strategy_core::StrategyParams::default())?;
        tracing::info!("Seeded default strategy parameters");
    }

    // 4. Clear any cooldowns that expired while the agent was down
    let lifecycle = Arc::new(PositionLifecycle::new(store.clone(), config.cooldown()));
    let swept = lifecycle.sweep_cooldowns(Utc::now())?;
    if swept > 0 {
        tracing::info!("Removed {swept} expired cooldown records");
    }

    // 5. Collaborators
    let provider = Arc::new(YahooChartClient::new(config.request_timeout())?);
    let notifier = Arc::new(WebhookNotifier::new(
        config.webhook_url.clone(),
        config.request_timeout(),
    )?);
    if config.webhook_url.is_empty() {
        tracing::info!("Webhook not configured, signals logged only");
    } else {
        tracing::info!("Webhook notifier ready");
    }

    let scanner = MarketScanner::new(
        config.clone(),
        store.clone(),
        provider,
        notifier,
        lifecycle.clone(),
    );
    tracing::info!(
        "Market scanner ready ({} symbols monitored)",
        store.watchlist()?.len()
    );

    // 6. Command queue (stdin transport)
    let (tx, mut rx) = mpsc::channel::<Command>(32);
    let _stdin_task = spawn_stdin_listener(tx);
    tracing::info!("Command listener ready (buy/sell/ignore/backtest SYMBOL)");

    // 7. Cycle loop
    let mut scan_interval = time::interval(Duration::from_secs(config.scan_interval_seconds));
    let mut stop_interval = time::interval(Duration::from_secs(config.hard_stop_interval_seconds));
    let mut sweep_interval = time::interval(Duration::from_secs(24 * 60 * 60));
    scan_interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
    stop_interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
    sweep_interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = scan_interval.tick() => {
                scanner.scan_cycle().await;
            }
            _ = stop_interval.tick() => {
                scanner.hard_stop_cycle().await;
            }
            _ = sweep_interval.tick() => {
                match lifecycle.sweep_cooldowns(Utc::now()) {
                    Ok(n) if n > 0 => tracing::info!("Removed {n} expired cooldown records"),
                    Ok(_) => {}
                    Err(e) => tracing::error!("Cooldown sweep failed: {e}"),
                }
            }
            Some(command) = rx.recv() => {
                match scanner.handle_command(command).await {
                    Ok(reply) => tracing::info!("{reply}"),
                    Err(e) => tracing::warn!("Command rejected: {e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received, stopping agent");
                break;
            }
        }
    }

    Ok(())
}
