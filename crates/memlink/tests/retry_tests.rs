//! Integration tests for the retry executor
//!
//! Operations are closures that count their invocations and fail on
//! demand, run against a manager connected to a wiremock server.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use memlink::MemlinkError;
use memlink::config::Config;
use memlink::connection::ConnectionManager;
use memlink::retry::{RetryExecutor, RetryPolicy};
use memlink::testing::fast_config;
use memlink::transport::PING_PATH;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Helpers
// =============================================================================

async fn healthy_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PING_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

async fn executor_for(config: Config) -> (Arc<ConnectionManager>, RetryExecutor) {
    let config = Arc::new(config);
    let manager = Arc::new(ConnectionManager::connect(config.clone()).await.unwrap());
    let executor = RetryExecutor::new(manager.clone(), RetryPolicy::from_config(&config));
    (manager, executor)
}

fn connection_error() -> MemlinkError {
    MemlinkError::Connection("connection reset by peer".to_string())
}

// =============================================================================
// Retry Behavior
// =============================================================================

#[tokio::test]
async fn test_succeeds_after_transient_failures() {
    let server = healthy_server().await;
    let mut config = fast_config(&server.uri());
    config.retry.max_retries = 5;
    let (manager, executor) = executor_for(config).await;

    let failures = 3;
    let calls = AtomicU32::new(0);
    let result = executor
        .execute(|_handle| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < failures {
                    Err(connection_error())
                } else {
                    Ok("stored")
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(result, "stored");
    assert_eq!(calls.load(Ordering::SeqCst), failures + 1);
    // Every failed attempt rebuilt the handle it ran on
    assert_eq!(manager.snapshot().await.generation, 1 + u64::from(failures));
}

#[tokio::test]
async fn test_exhaustion_after_max_retries() {
    let server = healthy_server().await;
    let mut config = fast_config(&server.uri());
    config.retry.max_retries = 4;
    config.retry.initial_delay_secs = 0.02;
    config.retry.backoff_factor = 2.0;
    let (_manager, executor) = executor_for(config).await;

    let calls = AtomicU32::new(0);
    let start = Instant::now();
    let err = executor
        .execute(|_handle| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(connection_error()) }
        })
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    match err {
        MemlinkError::RetriesExhausted { attempts, source } => {
            assert_eq!(attempts, 4);
            assert!(source.is_connection());
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    // 20ms + 40ms + 80ms between the four attempts
    assert!(elapsed >= Duration::from_millis(140), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn test_remote_rejection_is_not_retried() {
    let server = healthy_server().await;
    let (manager, executor) = executor_for(fast_config(&server.uri())).await;

    let calls = AtomicU32::new(0);
    let err = executor
        .execute(|_handle| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<(), _>(MemlinkError::Remote {
                    status: 400,
                    body: "missing user_id".to_string(),
                })
            }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(err, MemlinkError::Remote { status: 400, .. }));
    assert_eq!(manager.snapshot().await.generation, 1);
}

#[tokio::test]
async fn test_other_failures_are_unclassified() {
    let server = healthy_server().await;
    let (_manager, executor) = executor_for(fast_config(&server.uri())).await;

    let calls = AtomicU32::new(0);
    let err = executor
        .execute(|_handle| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(MemlinkError::Serialization("bad payload".to_string())) }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    match err {
        MemlinkError::Unclassified(message) => assert!(message.contains("bad payload")),
        other => panic!("expected unclassified error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_no_rebuild_when_auto_rebuild_disabled() {
    let server = healthy_server().await;
    let mut config = fast_config(&server.uri());
    config.connection.auto_rebuild = false;
    let (manager, executor) = executor_for(config).await;

    let calls = AtomicU32::new(0);
    executor
        .execute(|_handle| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(connection_error())
                } else {
                    Ok(())
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(manager.snapshot().await.generation, 1);
}

#[tokio::test]
async fn test_failed_health_check_is_retried() {
    let server = MockServer::start().await;
    // Connect succeeds, then the due health check and its rebuild both
    // outlast the ping timeout, then the service recovers
    Mock::given(method("GET"))
        .and(path(PING_PATH))
        .respond_with(ResponseTemplate::new(200))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(PING_PATH))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(PING_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = fast_config(&server.uri());
    config.connection.health_check_interval_secs = 0.0;
    config.connection.probe_timeout_secs = 0.2;
    let (manager, executor) = executor_for(config).await;

    let calls = AtomicU32::new(0);
    let result = executor
        .execute(|_handle| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok("stored") }
        })
        .await
        .unwrap();

    assert_eq!(result, "stored");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let snapshot = manager.snapshot().await;
    assert!(snapshot.healthy);
    assert_eq!(snapshot.generation, 2);
}

#[tokio::test]
async fn test_unrecoverable_health_check_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PING_PATH))
        .respond_with(ResponseTemplate::new(200))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(PING_PATH))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let mut config = fast_config(&server.uri());
    config.connection.health_check_interval_secs = 0.0;
    config.connection.probe_timeout_secs = 0.1;
    config.retry.max_retries = 3;
    let (_manager, executor) = executor_for(config).await;

    let calls = AtomicU32::new(0);
    let err = executor
        .execute(|_handle| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await
        .unwrap_err();

    // No handle ever became live, so the operation itself never ran
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    match err {
        MemlinkError::RetriesExhausted { attempts, source } => {
            assert_eq!(attempts, 3);
            assert!(source.is_connection());
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

// =============================================================================
// Against the Wire
// =============================================================================

#[tokio::test]
async fn test_server_error_surfaces_body_without_retry() {
    let server = healthy_server().await;
    Mock::given(method("POST"))
        .and(path("/v1/memories/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal failure"))
        .expect(1)
        .mount(&server)
        .await;
    let (_manager, executor) = executor_for(fast_config(&server.uri())).await;

    let body = serde_json::json!({"messages": []});
    let err = executor
        .execute(|handle| {
            let body = &body;
            async move { handle.post("/v1/memories/", body, &[]).await }
        })
        .await
        .unwrap_err();

    match err {
        MemlinkError::Remote { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "internal failure");
        }
        other => panic!("expected remote rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_closed_manager_fails_fast() {
    let server = healthy_server().await;
    let (manager, executor) = executor_for(fast_config(&server.uri())).await;
    manager.shutdown().await;

    let calls = AtomicU32::new(0);
    let result = executor
        .execute(|_handle| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;

    assert!(matches!(result, Err(MemlinkError::Closed)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
