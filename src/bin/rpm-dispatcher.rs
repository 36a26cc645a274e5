//! `rpm-dispatcher`: schedules pending RPM build tasks onto worker processes.
//!
//! Configuration is read from the JSON file named by `RPM_DISPATCH_CONFIG`
//! (a `.env` file is honoured). Logging follows `RUST_LOG`.

use std::sync::Arc;
use std::time::Duration;

use rpm_dispatch::builders::{build_manager, build_source, restore_workers};
use rpm_dispatch::config::DispatchConfig;
use rpm_dispatch::core::AppResult;
use rpm_dispatch::infra::RpmBuildLauncher;
use rpm_dispatch::runtime::BuildDispatcher;
use rpm_dispatch::util::init_tracing;
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> AppResult<()> {
    init_tracing();

    let cfg = DispatchConfig::from_env().map_err(anyhow::Error::msg)?;
    let launcher = RpmBuildLauncher::from_config(&cfg.launcher);
    let manager = Arc::new(build_manager(&cfg, launcher)?);

    let restored = restore_workers(&manager).await?;
    info!(restored, "previous workers restored");

    let source = build_source(&cfg)?;
    let dispatcher =
        BuildDispatcher::new(manager, source, Duration::from_secs(cfg.poll_interval_secs));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    dispatcher.run(shutdown_rx).await;
    Ok(())
}
