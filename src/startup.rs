//! Control plane runtime
//!
//! Wires the snapshot cache, the rebuild pipeline and the discovery server
//! together, then keeps fleets in sync with the intent directory until
//! shutdown.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::errors::{Error, Result};
use crate::services::{ConfigManager, InMemoryValidationUpdater, IntentLoader};
use crate::xds::{DiscoveryServer, FleetSnapshotCache};

/// Rebuild every fleet whose intent file changed.
///
/// A file counts as applied once its snapshot is active, even if some nodes
/// missed the push. Failed rebuilds are retried on the next scan.
pub async fn reconcile_once(loader: &mut IntentLoader, manager: &ConfigManager) -> Result<usize> {
    let pending = loader.scan()?;
    let mut applied = 0;
    for change in &pending {
        let fleet = &change.intent.fleet;
        match manager.update_configuration(&change.intent).await {
            Ok(_) => {}
            Err(e @ Error::Distribution { .. }) => {
                warn!(fleet = %fleet, error = %e, "Snapshot applied but some nodes were not updated")
            }
            Err(e) => {
                error!(fleet = %fleet, error = %e, "Fleet rebuild aborted, previous snapshot stays active");
                continue;
            }
        }
        loader.mark_applied(change);
        applied += 1;
    }
    Ok(applied)
}

/// Poll the intent directory until `shutdown` flips to `true`
pub async fn reconcile_loop(
    mut loader: IntentLoader,
    manager: Arc<ConfigManager>,
    interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = reconcile_once(&mut loader, &manager).await {
                    warn!(directory = %loader.directory().display(), error = %e, "Intent scan failed");
                }
            }
            signal = shutdown.changed() => {
                if signal.is_err() || *shutdown.borrow() {
                    info!("Stopping intent reconcile loop");
                    break;
                }
            }
        }
    }
}

/// Run the control plane until `shutdown` resolves
pub async fn run_control_plane<F>(config: AppConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let cache = Arc::new(FleetSnapshotCache::default());
    let manager = Arc::new(ConfigManager::new(
        &config,
        cache.clone(),
        Arc::new(InMemoryValidationUpdater::new()),
    ));

    let (stop_tx, stop_rx) = watch::channel(false);
    let reconcile = tokio::spawn(reconcile_loop(
        IntentLoader::new(config.intent.directory.clone()),
        manager,
        config.intent.poll_interval(),
        stop_rx,
    ));

    let signal = async move {
        shutdown.await;
        stop_tx.send_replace(true);
    };

    let served = DiscoveryServer::new(config.xds.clone(), cache).serve(signal).await;
    if let Err(e) = reconcile.await {
        error!(error = %e, "Intent reconcile task failed");
    }
    served
}
