//! HTTP transport handle for the remote memory service
//!
//! Wraps a pooled `reqwest::Client` bound to the service's base URL and the
//! fixed request headers. A handle is immutable once built; the connection
//! manager replaces it wholesale on rebuild.

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, redirect};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::error::{MemlinkError, Result};

/// Liveness endpoint used by probes and credential checks
pub const PING_PATH: &str = "/v1/ping/";

const MAX_REDIRECTS: usize = 10;

/// An owned HTTP connection pool bound to one base address
#[derive(Debug)]
pub struct TransportHandle {
    client: Client,
    base_url: Url,
    generation: u64,
    permits: Arc<Semaphore>,
    pool_timeout: Duration,
}

impl TransportHandle {
    /// Build a fresh handle from configuration.
    ///
    /// Fails when no API key is configured or the host is not a valid URL.
    pub fn build(config: &Config, generation: u64) -> Result<Self> {
        let api_key = config
            .client
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| MemlinkError::Config("API key not provided".to_string()))?;

        let mut auth = HeaderValue::from_str(&format!("{} {}", config.client.auth_scheme, api_key))
            .map_err(|e| MemlinkError::Config(format!("Invalid API key header: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let timeout = &config.timeout;
        let client = Client::builder()
            .default_headers(headers)
            .user_agent(config.client.user_agent.clone())
            .connect_timeout(timeout.connect())
            .read_timeout(timeout.read())
            // reqwest has no separate write phase, so the whole exchange is
            // bounded by upload plus response time
            .timeout(timeout.write() + timeout.read())
            .pool_max_idle_per_host(config.limits.max_idle_connections)
            .pool_idle_timeout(config.limits.idle_expiry())
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| MemlinkError::Config(format!("Failed to create HTTP client: {e}")))?;

        let base_url = parse_base_url(&config.client.host)?;

        Ok(Self {
            client,
            base_url,
            generation,
            permits: Arc::new(Semaphore::new(config.limits.max_connections)),
            pool_timeout: timeout.pool(),
        })
    }

    /// Rebuild counter value this handle was created under
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an API path against the base URL, keeping any path prefix
    pub fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| MemlinkError::Config(format!("Invalid request path '{path}': {e}")))
    }

    /// `GET` with query parameters, returning the decoded JSON body
    pub async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Option<Value>> {
        let request = self.client.get(self.url(path)?).query(query);
        self.send(request).await
    }

    /// `POST` a JSON body with optional query parameters
    pub async fn post(
        &self,
        path: &str,
        body: &Value,
        query: &[(String, String)],
    ) -> Result<Option<Value>> {
        let request = self.client.post(self.url(path)?).query(query).json(body);
        self.send(request).await
    }

    /// Lightweight liveness check; never fails, only reports
    pub async fn ping(&self, timeout: Duration) -> bool {
        let url = match self.url(PING_PATH) {
            Ok(url) => url,
            Err(_) => return false,
        };

        match self.client.get(url).timeout(timeout).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!("Ping returned {}", response.status());
                false
            }
            Err(e) => {
                debug!("Ping failed: {}", e);
                false
            }
        }
    }

    /// Confirm the credential is accepted by the service.
    ///
    /// Returns the account email when the service reports one.
    pub async fn validate_credentials(&self, timeout: Duration) -> Result<Option<String>> {
        let request = self.client.get(self.url(PING_PATH)?).timeout(timeout);
        let body = self.send(request).await?;
        Ok(body
            .as_ref()
            .and_then(|b| b.get("user_email"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Option<Value>> {
        let _permit = tokio::time::timeout(self.pool_timeout, self.permits.acquire())
            .await
            .map_err(|_| {
                MemlinkError::Connection(format!(
                    "Timed out after {:?} waiting for a free connection",
                    self.pool_timeout
                ))
            })?
            .map_err(|_| MemlinkError::Closed)?;

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(MemlinkError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
            MemlinkError::Unclassified(format!("Invalid JSON response from {status}: {e}"))
        })?;

        Ok((!value.is_null()).then_some(value))
    }
}

fn parse_base_url(host: &str) -> Result<Url> {
    let mut base = Url::parse(host)
        .map_err(|e| MemlinkError::Config(format!("Invalid host '{host}': {e}")))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}
