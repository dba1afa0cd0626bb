use std::sync::Arc;

use threadbridge_core::config::BridgeConfig;
use threadbridge_core::control;
use threadbridge_core::sync::{EntityLocks, SweepScheduler};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

use crate::commands::common::Bridge;
use crate::error::CliError;

const REQUEST_QUEUE: usize = 32;

pub async fn run_bridge(config: BridgeConfig) -> Result<(), CliError> {
    // Bind before connecting so a second bridge on this host fails fast.
    let listener = TcpListener::bind(config.control_addr).await?;
    let bridge = Bridge::connect(config).await?;

    let scheduler = Arc::new(
        SweepScheduler::new(
            Arc::new(bridge.synchronizer(EntityLocks::new())),
            Arc::clone(&bridge.chat),
            bridge.config.sync_interval,
        )
        .with_lifecycle(Arc::new(bridge.lifecycle()), bridge.config.lifecycle_interval),
    );

    let refresher = spawn_directory_refresh(&bridge);

    let (stop, stopped) = oneshot::channel::<()>();
    let (requests, receiver) = mpsc::channel(REQUEST_QUEUE);
    let control = tokio::spawn(control::serve(listener, requests, async move {
        let _ = stopped.await;
    }));

    scheduler
        .run(receiver, async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(%error, "Cannot listen for Ctrl-C, stopping");
            }
        })
        .await;

    let _ = stop.send(());
    refresher.abort();
    match control.await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => tracing::error!(%error, "Control endpoint failed"),
        Err(error) => tracing::error!(%error, "Control endpoint task aborted"),
    }
    Ok(())
}

/// Re-read users and teams on the lifecycle interval.
fn spawn_directory_refresh(bridge: &Bridge) -> tokio::task::JoinHandle<()> {
    let store = Arc::clone(&bridge.store);
    let directory = Arc::clone(&bridge.directory);
    let interval = bridge.config.lifecycle_interval;
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        // The first tick completes immediately; the index is fresh already.
        tick.tick().await;
        loop {
            tick.tick().await;
            if let Err(error) = directory.reindex(store.as_ref()).await {
                tracing::warn!(
                    %error,
                    last_refresh = ?directory.refreshed_at(),
                    "Directory refresh failed, keeping the old index"
                );
            }
        }
    })
}
