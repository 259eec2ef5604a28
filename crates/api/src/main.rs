//! Interview Proctor - Main Entry Point

use anyhow::Context;
use api::{init_logging, run_server, AppState, Settings};
use metrics_exporter_prometheus::PrometheusBuilder;
use session::{FsDetectorFactory, SessionManager};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    init_logging(&settings.logging);

    info!("=== Interview Proctor v{} ===", env!("CARGO_PKG_VERSION"));

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("installing metrics recorder")?;

    let factory = FsDetectorFactory::without_model();
    let sessions = SessionManager::new(Arc::new(factory), settings.detector.clone());
    let state = Arc::new(AppState::new(sessions, Some(metrics)));

    run_server(state, &settings.server.bind_addr)
        .await
        .context("serving HTTP")?;

    Ok(())
}
