//! Transport lifecycle and shared connection state
//!
//! The manager is the only owner of the live [`TransportHandle`]. Foreground
//! requests and the background health monitor both go through it, and every
//! state transition happens under one async mutex.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{MemlinkError, Result};
use crate::transport::TransportHandle;

/// Mutable connection state, guarded by the manager's mutex
#[derive(Debug, Default)]
struct ConnectionState {
    healthy: bool,
    last_checked: Option<Instant>,
    last_checked_at: Option<DateTime<Utc>>,
    generation: u64,
    transport: Option<Arc<TransportHandle>>,
    closed: bool,
}

impl ConnectionState {
    fn mark_checked(&mut self, healthy: bool) {
        self.healthy = healthy;
        self.last_checked = Some(Instant::now());
        self.last_checked_at = Some(Utc::now());
    }
}

/// Point-in-time copy of the connection state
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSnapshot {
    pub healthy: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub generation: u64,
    pub closed: bool,
}

/// Owns the transport handle and keeps it healthy
#[derive(Debug)]
pub struct ConnectionManager {
    config: Arc<Config>,
    state: Mutex<ConnectionState>,
}

impl ConnectionManager {
    /// Create a manager and establish the first validated transport
    pub async fn connect(config: Arc<Config>) -> Result<Self> {
        let manager = Self {
            config,
            state: Mutex::new(ConnectionState::default()),
        };
        manager.rebuild().await?;
        Ok(manager)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The live transport handle.
    ///
    /// Fetch this per attempt; a rebuild replaces it.
    pub async fn current(&self) -> Result<Arc<TransportHandle>> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(MemlinkError::Closed);
        }
        state.transport.clone().ok_or_else(|| {
            MemlinkError::Connection("No live transport, a rebuild is pending".to_string())
        })
    }

    /// Probe when unhealthy or stale, and rebuild if the probe fails.
    ///
    /// The lock is held throughout so concurrent callers see one rebuild.
    pub async fn ensure_healthy(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(MemlinkError::Closed);
        }
        if state.healthy && !self.check_due(&state) {
            return Ok(());
        }

        let alive = match &state.transport {
            Some(transport) => transport.ping(self.config.connection.probe_timeout()).await,
            None => false,
        };
        state.mark_checked(alive);
        if alive {
            debug!("Connection probe succeeded (generation {})", state.generation);
            return Ok(());
        }

        warn!(
            "Connection probe failed (generation {}), rebuilding transport",
            state.generation
        );
        self.rebuild_locked(&mut state).await
    }

    /// Liveness check against the current handle; never fails.
    ///
    /// The outcome is recorded only if that handle is still the live one.
    pub async fn probe(&self) -> bool {
        self.probe_live().await.1
    }

    /// Probe and report which generation was checked, if any
    async fn probe_live(&self) -> (Option<u64>, bool) {
        let transport = {
            let state = self.state.lock().await;
            if state.closed {
                return (None, false);
            }
            state.transport.clone()
        };

        let Some(transport) = transport else {
            let mut state = self.state.lock().await;
            if !state.closed {
                state.mark_checked(false);
            }
            return (None, false);
        };

        let alive = transport.ping(self.config.connection.probe_timeout()).await;

        let mut state = self.state.lock().await;
        // A rebuild meanwhile, failed or not, makes this result stale
        let still_live = state
            .transport
            .as_ref()
            .is_some_and(|live| Arc::ptr_eq(live, &transport));
        if !state.closed && still_live {
            state.mark_checked(alive);
        }
        if !alive {
            warn!("Health probe failed (generation {})", transport.generation());
        }
        (Some(transport.generation()), alive)
    }

    /// Replace the transport with a fresh, validated one
    pub async fn rebuild(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.rebuild_locked(&mut state).await
    }

    /// Rebuild only if `generation` is still the live handle's generation.
    ///
    /// Lets a failing request skip the rebuild when another context already
    /// replaced the handle it used.
    pub async fn rebuild_if_current(&self, generation: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.healthy && state.transport.is_some() && state.generation != generation {
            debug!(
                "Skipping rebuild, generation {} already replaced by {}",
                generation, state.generation
            );
            return Ok(());
        }
        self.rebuild_locked(&mut state).await
    }

    /// One health monitor cycle: probe when due, rebuild when allowed
    pub async fn heartbeat(&self) -> Result<()> {
        let due = {
            let state = self.state.lock().await;
            !state.closed && self.check_due(&state)
        };
        if !due {
            return Ok(());
        }

        let (generation, alive) = self.probe_live().await;
        if alive {
            return Ok(());
        }

        if self.config.connection.auto_rebuild {
            match generation {
                Some(generation) => self.rebuild_if_current(generation).await,
                None => self.rebuild().await,
            }
        } else {
            warn!("Connection unhealthy and auto rebuild disabled");
            Ok(())
        }
    }

    /// Release the transport and refuse further use. Idempotent.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        state.healthy = false;
        state.transport = None;
        info!("Connection manager shut down (generation {})", state.generation);
    }

    pub async fn snapshot(&self) -> ConnectionSnapshot {
        let state = self.state.lock().await;
        ConnectionSnapshot {
            healthy: state.healthy,
            last_checked_at: state.last_checked_at,
            generation: state.generation,
            closed: state.closed,
        }
    }

    fn check_due(&self, state: &ConnectionState) -> bool {
        match state.last_checked {
            Some(checked) => checked.elapsed() >= self.config.connection.health_check_interval(),
            None => true,
        }
    }

    async fn rebuild_locked(&self, state: &mut ConnectionState) -> Result<()> {
        if state.closed {
            return Err(MemlinkError::Closed);
        }

        // Dropping the old handle closes its idle sockets
        state.transport = None;
        state.healthy = false;

        let generation = state.generation + 1;
        let transport = TransportHandle::build(&self.config, generation)?;
        let account = transport
            .validate_credentials(self.config.connection.probe_timeout())
            .await?;

        state.transport = Some(Arc::new(transport));
        state.generation = generation;
        state.mark_checked(true);

        match account {
            Some(email) => info!("Transport rebuilt (generation {generation}) for {email}"),
            None => info!("Transport rebuilt (generation {generation})"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fast_config;
    use crate::transport::PING_PATH;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_ping(server: &MockServer, status: u16) {
        Mock::given(method("GET"))
            .and(path(PING_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_connect_validates_credentials() {
        let mock_server = MockServer::start().await;
        mount_ping(&mock_server, 200).await;

        let manager = ConnectionManager::connect(Arc::new(fast_config(&mock_server.uri())))
            .await
            .unwrap();
        let snapshot = manager.snapshot().await;

        assert!(snapshot.healthy);
        assert_eq!(snapshot.generation, 1);
        assert!(snapshot.last_checked_at.is_some());
        assert_eq!(manager.current().await.unwrap().generation(), 1);
    }

    #[tokio::test]
    async fn test_connect_fails_on_rejected_credentials() {
        let mock_server = MockServer::start().await;
        mount_ping(&mock_server, 401).await;

        let result = ConnectionManager::connect(Arc::new(fast_config(&mock_server.uri()))).await;
        assert!(matches!(result, Err(MemlinkError::Remote { status: 401, .. })));
    }

    #[tokio::test]
    async fn test_failed_rebuild_leaves_unhealthy() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PING_PATH))
            .respond_with(ResponseTemplate::new(200))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        mount_ping(&mock_server, 503).await;

        let manager = ConnectionManager::connect(Arc::new(fast_config(&mock_server.uri())))
            .await
            .unwrap();

        assert!(manager.rebuild().await.is_err());
        let snapshot = manager.snapshot().await;
        assert!(!snapshot.healthy);
        assert_eq!(snapshot.generation, 1);
        assert!(manager.current().await.unwrap_err().is_connection());
    }

    #[tokio::test]
    async fn test_rebuild_if_current_skips_replaced_generation() {
        let mock_server = MockServer::start().await;
        mount_ping(&mock_server, 200).await;

        let manager = ConnectionManager::connect(Arc::new(fast_config(&mock_server.uri())))
            .await
            .unwrap();
        manager.rebuild().await.unwrap();
        assert_eq!(manager.snapshot().await.generation, 2);

        // A request that failed on generation 1 must not tear down generation 2
        manager.rebuild_if_current(1).await.unwrap();
        assert_eq!(manager.snapshot().await.generation, 2);

        manager.rebuild_if_current(2).await.unwrap();
        assert_eq!(manager.snapshot().await.generation, 3);
    }

    #[tokio::test]
    async fn test_liveness_result_dropped_after_failed_rebuild() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PING_PATH))
            .respond_with(ResponseTemplate::new(200))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(PING_PATH))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        mount_ping(&mock_server, 503).await;

        let manager = Arc::new(
            ConnectionManager::connect(Arc::new(fast_config(&mock_server.uri())))
                .await
                .unwrap(),
        );

        let checking = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.probe().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.rebuild().await.is_err());

        // The slow liveness check succeeded against a handle that no longer exists
        assert!(checking.await.unwrap());
        let snapshot = manager.snapshot().await;
        assert!(!snapshot.healthy);
        assert_eq!(snapshot.generation, 1);
        assert!(manager.current().await.is_err());
    }

    #[tokio::test]
    async fn test_heartbeat_keeps_handle_replaced_mid_check() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PING_PATH))
            .respond_with(ResponseTemplate::new(200))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(PING_PATH))
            .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(300)))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        mount_ping(&mock_server, 200).await;

        let mut config = fast_config(&mock_server.uri());
        config.connection.health_check_interval_secs = 0.0;
        let manager = Arc::new(ConnectionManager::connect(Arc::new(config)).await.unwrap());

        let beating = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.heartbeat().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.rebuild().await.unwrap();
        assert_eq!(manager.snapshot().await.generation, 2);

        // The failed check ran on generation 1 and must not replace generation 2
        beating.await.unwrap().unwrap();
        let snapshot = manager.snapshot().await;
        assert!(snapshot.healthy);
        assert_eq!(snapshot.generation, 2);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let mock_server = MockServer::start().await;
        mount_ping(&mock_server, 200).await;

        let manager = ConnectionManager::connect(Arc::new(fast_config(&mock_server.uri())))
            .await
            .unwrap();
        manager.shutdown().await;
        manager.shutdown().await;

        let snapshot = manager.snapshot().await;
        assert!(snapshot.closed);
        assert!(!snapshot.healthy);
        assert!(matches!(manager.current().await, Err(MemlinkError::Closed)));
        assert!(matches!(manager.ensure_healthy().await, Err(MemlinkError::Closed)));
        assert!(matches!(manager.rebuild().await, Err(MemlinkError::Closed)));
        assert!(!manager.probe().await);
    }
}
