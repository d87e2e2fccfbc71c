//! Scheduled refresh loop.
//!
//! Calls [`DeviceStateCoordinator::refresh`] once immediately and then on
//! every interval tick. A failed update waits for the next tick; rejected
//! credentials stop the loop until the host renews them and starts a new one.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::coordinator::DeviceStateCoordinator;

/// Why a refresh loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerExit {
    /// The shutdown signal fired or its sender was dropped
    Shutdown,
    /// The device API rejected the credentials
    ReauthRequired,
}

/// Spawn [`run_refresh_loop`] on the current runtime.
pub fn spawn_refresh_loop(
    coordinator: Arc<DeviceStateCoordinator>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<PollerExit> {
    tokio::spawn(run_refresh_loop(coordinator, shutdown))
}

/// Refresh `coordinator` on its configured interval until shutdown or reauth.
///
/// Ticks never overlap: a slow refresh delays the next tick instead of
/// queueing a burst.
pub async fn run_refresh_loop(
    coordinator: Arc<DeviceStateCoordinator>,
    mut shutdown: watch::Receiver<bool>,
) -> PollerExit {
    let mut timer = interval(coordinator.config().refresh_interval());
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        device_id = %coordinator.device_id(),
        interval_secs = coordinator.config().refresh_interval_secs,
        "Starting refresh loop"
    );

    loop {
        if *shutdown.borrow() {
            return PollerExit::Shutdown;
        }

        tokio::select! {
            _ = timer.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!(device_id = %coordinator.device_id(), "Refresh loop stopped");
                    return PollerExit::Shutdown;
                }
                continue;
            }
        }

        match coordinator.refresh().await {
            Ok(snapshot) => {
                debug!(
                    device_id = %coordinator.device_id(),
                    version = snapshot.version,
                    online = snapshot.status.online,
                    "Refresh completed"
                );
            }
            Err(e) if e.requires_reauth() => {
                coordinator.request_reauth();
                info!(device_id = %coordinator.device_id(), "Refresh loop paused until re-authentication");
                return PollerExit::ReauthRequired;
            }
            // Already logged by the coordinator
            Err(_) => {}
        }
    }
}
