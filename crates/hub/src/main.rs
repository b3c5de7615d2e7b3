mod config;
mod db;
mod state;
mod web;

use anyhow::Result;
use std::{env, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use db::Db;
use state::HubState;
use web::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Env config ──────────────────────────────────────────────────
    let db_url = env::var("DB_URL").unwrap_or_else(|_| "sqlite:hydro.db?mode=rwc".to_string());
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

    // ── Database ────────────────────────────────────────────────────
    let db = Db::connect(&db_url).await?;
    db.migrate().await?;

    let runs = db.list_runs().await?;
    match db.last_entry_any().await? {
        Some(last) => info!(
            runs = runs.len(),
            last_run = last.run_id,
            last_entry = %last.date,
            "db ready"
        ),
        None => info!(runs = runs.len(), "db ready, no entries logged yet"),
    }

    // ── Config file (targets, systems, catalog) ─────────────────────
    let config = config::load(&config_path)?;
    if !config.settings.enabled {
        warn!("recommendations disabled in config; logging endpoints only");
    }
    if config.profiles.catalog().is_empty() {
        warn!("nutrient catalog is empty; EC deficits will report no product");
    }

    // ── Shared state (ephemeral, for /api/status) ───────────────────
    let shared = HubState::shared();
    shared
        .write()
        .await
        .record_system("hub started".to_string());

    // ── Web server ──────────────────────────────────────────────────
    web::serve(AppState {
        db,
        config: Arc::new(config),
        shared,
    })
    .await
}
