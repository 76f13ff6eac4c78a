//! Background health monitor
//!
//! Wakes on a fixed heartbeat, asks the [`ConnectionManager`] to probe when
//! the last check is stale, and rebuilds broken transports. Failures are
//! logged and absorbed; the loop only ends on an explicit stop.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::manager::ConnectionManager;

/// Pause after a failed cycle before the next heartbeat
pub const FAILURE_COOLDOWN: Duration = Duration::from_secs(5);

/// Upper bound on waiting for the task to exit during stop
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle of the monitor task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug)]
struct MonitorInner {
    state: MonitorState,
    shutdown_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

/// Handle to the supervised heartbeat task
#[derive(Debug)]
pub struct HealthMonitor {
    inner: Mutex<MonitorInner>,
}

impl HealthMonitor {
    /// Spawn the heartbeat loop on the current tokio runtime
    pub fn start(manager: Arc<ConnectionManager>) -> Self {
        Self::start_with_cooldown(manager, FAILURE_COOLDOWN)
    }

    /// Like [`HealthMonitor::start`] with a custom failure cool-down
    pub fn start_with_cooldown(manager: Arc<ConnectionManager>, cooldown: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let interval = manager.config().connection.heartbeat_interval();

        info!("Starting health monitor (heartbeat every {:?})", interval);
        let handle = tokio::spawn(run(manager, interval, cooldown, shutdown_rx));

        Self {
            inner: Mutex::new(MonitorInner {
                state: MonitorState::Running,
                shutdown_tx: Some(shutdown_tx),
                handle: Some(handle),
            }),
        }
    }

    pub fn state(&self) -> MonitorState {
        match self.inner.lock() {
            Ok(inner) => inner.state,
            Err(poisoned) => poisoned.into_inner().state,
        }
    }

    /// Signal the loop to exit and wait a bounded time for it.
    ///
    /// Safe to call any number of times; only the first call does work.
    pub async fn stop(&self) {
        let (shutdown_tx, handle) = {
            let mut inner = match self.inner.lock() {
                Ok(inner) => inner,
                Err(poisoned) => poisoned.into_inner(),
            };
            if inner.state != MonitorState::Running {
                return;
            }
            inner.state = MonitorState::Stopping;
            (inner.shutdown_tx.take(), inner.handle.take())
        };

        if let Some(tx) = shutdown_tx {
            let _ = tx.send(true);
        }

        if let Some(mut handle) = handle {
            match tokio::time::timeout(JOIN_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => debug!("Health monitor exited"),
                Ok(Err(e)) => warn!("Health monitor task ended abnormally: {}", e),
                Err(_) => {
                    warn!("Health monitor did not stop within {:?}, aborting", JOIN_TIMEOUT);
                    handle.abort();
                }
            }
        }

        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.state = MonitorState::Stopped;
        info!("Health monitor stopped");
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        let inner = match self.inner.get_mut() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(tx) = inner.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = inner.handle.take() {
            handle.abort();
        }
        inner.state = MonitorState::Stopped;
    }
}

async fn run(
    manager: Arc<ConnectionManager>,
    interval: Duration,
    cooldown: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if !wait_or_shutdown(&mut shutdown_rx, interval).await {
            break;
        }

        let cycle = AssertUnwindSafe(manager.heartbeat()).catch_unwind().await;
        let failure = match cycle {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some("heartbeat panicked".to_string()),
        };

        if let Some(reason) = failure {
            error!(
                "Health monitor cycle failed: {}; retrying in {:?}",
                reason, cooldown
            );
            if !wait_or_shutdown(&mut shutdown_rx, cooldown).await {
                break;
            }
        }
    }
}

/// Sleep for `duration`; returns false if shutdown was requested first
async fn wait_or_shutdown(shutdown_rx: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if *shutdown_rx.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        // A dropped sender means the monitor handle is gone
        _ = shutdown_rx.changed() => return false,
    }
    !*shutdown_rx.borrow()
}
