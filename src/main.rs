//! CashCow Economy - engine host
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────────┐    ┌──────────┐
//! │  Config  │───▶│ Logging  │───▶│ Store + Lock │───▶│ Economy  │
//! │  (YAML)  │    │(tracing) │    │  (PG / mem)  │    │ services │
//! └──────────┘    └──────────┘    └──────────────┘    └──────────┘
//! ```
//!
//! `--env <name>` selects `config/<name>.yaml` (default `dev`).
//! `--check` wires everything, runs the health check and exits.

use anyhow::Context;
use cashcow_economy::config::AppConfig;
use cashcow_economy::logging::init_logging;
use cashcow_economy::services::Economy;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

fn check_only() -> bool {
    std::env::args().any(|a| a == "--check")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = init_logging(&app_config);

    tracing::info!("Starting CashCow economy engine in {} mode", env);

    let economy = Economy::from_config(&app_config)
        .await
        .context("Failed to wire economy engine")?;

    economy
        .health_check()
        .await
        .context("Store health check failed")?;

    match economy.seed_root_admin().await? {
        Some(root) => tracing::info!(actor = %root.id, "Root admin ready"),
        None => tracing::warn!("root_wallet not configured, new accounts start without a referrer"),
    }

    if check_only() {
        tracing::info!("Startup check passed");
        return Ok(());
    }

    tracing::info!("Economy engine ready, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");
    Ok(())
}
