use session_ledger::{services::SweepScheduler, AppState, Config};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,session_ledger=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting session ledger");

    // Load configuration
    let config = Config::load()?;

    tracing::info!(
        "Loaded configuration - sweep every {}s, duplicate window {}s",
        config.scheduler.sweep_interval_secs,
        config.ledger.duplicate_window_secs
    );

    // Initialize application state
    let state = AppState::new(config.clone()).await?;

    tracing::info!("Initialized application state");

    if !config.scheduler.enabled {
        tracing::warn!("Deduction scheduler disabled, nothing to run");
        return Ok(());
    }

    let scheduler = SweepScheduler::new(
        state.deduction_service.clone(),
        Duration::from_secs(config.scheduler.sweep_interval_secs.max(1)),
    );

    let runs = scheduler
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await;

    tracing::info!("Shut down after {} sweeps", runs);

    Ok(())
}
