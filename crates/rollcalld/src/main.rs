use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use rollcall_store::Store;

mod config;
mod dbus_interface;
mod engine;

use config::Config;
use dbus_interface::AttendanceService;
use engine::Engine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let cfg = Config::from_env();
    if let Some(parent) = cfg.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }

    let store = Store::open(&cfg.db_path).await?;
    let engine = Engine::new(
        store,
        cfg.metric,
        cfg.similarity_threshold,
        cfg.cooldown_secs,
    )
    .await?;

    tracing::info!(
        metric = %cfg.metric,
        threshold = cfg.similarity_threshold,
        cooldown_secs = cfg.cooldown_secs,
        "engine ready"
    );

    let service = AttendanceService::new(engine, cfg.default_location.clone());
    let _conn = zbus::connection::Builder::session()?
        .name("org.rollcall.Attendance1")?
        .serve_at("/org/rollcall/Attendance1", service)?
        .build()
        .await
        .context("registering on the session bus")?;

    tracing::info!("rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
