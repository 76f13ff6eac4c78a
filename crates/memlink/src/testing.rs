//! Test utilities for memlink
//!
//! Configuration tuned for tests against a local mock server: millisecond
//! backoff, short probe timeouts, and a heartbeat slow enough that the
//! background monitor stays out of the way unless a test speeds it up.

use crate::config::Config;

/// Config pointing at `host` with test credentials and fast retries.
///
/// Health checks are only triggered by an unhealthy state, never by age.
pub fn fast_config(host: &str) -> Config {
    let mut config = Config::default();
    config.client.host = host.to_string();
    config.client.api_key = Some("test-key".to_string());

    config.timeout.connect_secs = 1.0;
    config.timeout.read_secs = 5.0;
    config.timeout.write_secs = 5.0;
    config.timeout.pool_secs = 1.0;

    config.retry.max_retries = 3;
    config.retry.initial_delay_secs = 0.01;
    config.retry.backoff_factor = 2.0;

    config.data.inter_chunk_delay_secs = 0.01;

    config.connection.health_check_interval_secs = 3600.0;
    config.connection.heartbeat_interval_secs = 3600.0;
    config.connection.probe_timeout_secs = 1.0;

    config
}

/// A local address with nothing listening on it
pub fn unreachable_host() -> String {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .unwrap_or(9);
    format!("http://127.0.0.1:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_config_is_valid() {
        let config = fast_config("http://localhost:1234");
        assert!(config.validate().is_ok());
        assert_eq!(config.client.api_key.as_deref(), Some("test-key"));
    }

    #[test]
    fn fast_config_backoff_is_short() {
        let config = fast_config("http://localhost:1234");
        let total: f64 = (0..config.retry.max_retries)
            .map(|i| config.retry.initial_delay_secs * config.retry.backoff_factor.powi(i as i32))
            .sum();
        assert!(total < 0.5);
    }
}
