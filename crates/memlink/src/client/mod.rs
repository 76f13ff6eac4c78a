//! Memory client facade
//!
//! Composes the connection manager, health monitor, retry executor and
//! chunker into the operations callers use: `add`, `search`, `list_all`
//! and `close`.

pub mod types;

use serde_json::{Map, Value, json};
use std::slice;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use crate::chunker;
use crate::config::Config;
use crate::connection::{ConnectionManager, ConnectionSnapshot, HealthMonitor};
use crate::error::{MemlinkError, Result};
use crate::retry::{RetryExecutor, RetryPolicy};

pub use types::{ApiVersion, MemoryInput, Message, RequestOptions};

const MEMORIES_PATH: &str = "/v1/memories/";

/// Resilient client for a remote memory service
#[derive(Debug)]
pub struct MemoryClient {
    config: Arc<Config>,
    manager: Arc<ConnectionManager>,
    monitor: HealthMonitor,
    executor: RetryExecutor,
    closed: AtomicBool,
}

impl MemoryClient {
    /// Connect to the service and start the background health monitor.
    ///
    /// Fails if the configuration is invalid or the credential is missing
    /// or rejected.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let manager = Arc::new(ConnectionManager::connect(config.clone()).await?);
        let monitor = HealthMonitor::start(manager.clone());
        let executor = RetryExecutor::new(manager.clone(), RetryPolicy::from_config(&config));

        info!("Memory client connected to {}", config.client.host);

        Ok(Self {
            config,
            manager,
            monitor,
            executor,
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn connection_status(&self) -> ConnectionSnapshot {
        self.manager.snapshot().await
    }

    /// Store memories from raw text or a message list.
    ///
    /// Payloads above the soft chunk threshold are split and sent as
    /// sequential requests; the result is then a summary of every chunk.
    pub async fn add(
        &self,
        input: impl Into<MemoryInput>,
        options: &RequestOptions,
    ) -> Result<Value> {
        self.ensure_open()?;

        let input = input.into();
        let params = options.prepare(&self.config.client);
        let payload = add_payload(&input.to_messages(), &params);
        let size = serde_json::to_vec(&payload)?.len();

        debug!("Prepared add payload of {} bytes", size);

        if size > self.config.data.soft_chunk_threshold {
            info!(
                "Payload of {} bytes exceeds {} bytes, sending in chunks",
                size, self.config.data.soft_chunk_threshold
            );
            return self.add_chunked(&input, &params).await;
        }

        let result = self.post(MEMORIES_PATH, &payload, &[]).await?;
        Ok(result.unwrap_or_else(empty_object))
    }

    /// Semantic search over stored memories
    pub async fn search(
        &self,
        query: &str,
        version: ApiVersion,
        options: &RequestOptions,
    ) -> Result<Value> {
        self.ensure_open()?;

        let mut body = Map::new();
        body.insert("query".to_string(), Value::String(query.to_string()));
        body.extend(options.prepare(&self.config.client));

        let path = format!("/{}/memories/search/", version);
        let result = self.post(&path, &Value::Object(body), &[]).await?;
        Ok(result.unwrap_or_else(empty_list))
    }

    /// List stored memories.
    ///
    /// `v1` sends the options as a query string. `v2` sends them as the
    /// request body, except `page` and `page_size`, which go to the query
    /// string when both are given.
    pub async fn list_all(&self, version: ApiVersion, options: &RequestOptions) -> Result<Value> {
        self.ensure_open()?;

        let mut params = options.prepare(&self.config.client);
        let path = format!("/{}/memories/", version);

        let result = match version {
            ApiVersion::V1 => {
                let query = types::to_query(&params);
                let query = query.as_slice();
                let path = path.as_str();
                self.executor
                    .execute(move |handle| async move { handle.get(path, query).await })
                    .await?
            }
            ApiVersion::V2 => {
                let mut paging = Map::new();
                if params.contains_key("page") && params.contains_key("page_size") {
                    for key in ["page", "page_size"] {
                        if let Some(value) = params.remove(key) {
                            paging.insert(key.to_string(), value);
                        }
                    }
                }
                let query = types::to_query(&paging);
                self.post(&path, &Value::Object(params), &query).await?
            }
        };

        Ok(result.unwrap_or_else(empty_list))
    }

    /// Stop the health monitor and release the transport.
    ///
    /// Idempotent; later operations fail with [`MemlinkError::Closed`].
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.monitor.stop().await;
        self.manager.shutdown().await;
        info!("Memory client closed");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MemlinkError::Closed);
        }
        Ok(())
    }

    async fn post(
        &self,
        path: &str,
        body: &Value,
        query: &[(String, String)],
    ) -> Result<Option<Value>> {
        self.executor
            .execute(move |handle| async move { handle.post(path, body, query).await })
            .await
    }

    async fn add_chunked(
        &self,
        input: &MemoryInput,
        params: &Map<String, Value>,
    ) -> Result<Value> {
        // The cap bounds the whole request body, escaping included
        let cap = self.config.data.hard_chunk_cap;
        let pieces: Option<Vec<Vec<Message>>> = match input {
            MemoryInput::Text(text) => chunker::split_to_fit(text, cap, |piece| {
                body_len(slice::from_ref(&Message::user(piece)), params)
            })
            .map(|pieces| {
                pieces
                    .into_iter()
                    .map(|piece| vec![Message::user(piece)])
                    .collect()
            }),
            MemoryInput::Messages(messages) => {
                chunker::split_messages_to_fit(messages, cap, |message| {
                    body_len(slice::from_ref(message), params)
                })
                .map(|pieces| pieces.into_iter().map(|message| vec![message]).collect())
            }
        };
        let pieces = pieces.ok_or_else(|| {
            MemlinkError::Config(format!(
                "data.hard_chunk_cap ({cap} bytes) is too small for the request envelope"
            ))
        })?;

        let chunks = chunker::into_chunks(pieces);
        let total = chunks.len();
        let delay = self.config.data.inter_chunk_delay();
        let mut results = Vec::with_capacity(total);

        for chunk in chunks {
            info!("Sending chunk {}/{}", chunk.sequence_index + 1, chunk.total_chunks);

            let payload = add_payload(&chunk.content, params);
            match self.post(MEMORIES_PATH, &payload, &[]).await {
                Ok(result) => results.push(result.unwrap_or_else(empty_object)),
                Err(e) => {
                    return Err(MemlinkError::ChunkUpload {
                        succeeded: results.len(),
                        total,
                        source: Box::new(e),
                    });
                }
            }

            if chunk.sequence_index + 1 < total {
                tokio::time::sleep(delay).await;
            }
        }

        if results.len() == 1 {
            return Ok(results.remove(0));
        }

        Ok(json!({
            "message": format!("Successfully added {} chunks", results.len()),
            "chunks": results.len(),
            "results": results,
        }))
    }
}

/// Extract the `memory` text of each entry in a search or list result.
///
/// Accepts both a bare list and a `{"results": [...]}` wrapper.
pub fn flatten_memories(result: &Value) -> Vec<String> {
    let entries = match result {
        Value::Array(entries) => entries,
        Value::Object(map) => match map.get("results") {
            Some(Value::Array(entries)) => entries,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    entries
        .iter()
        .filter_map(|entry| entry.get("memory").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

fn add_payload(messages: &[Message], params: &Map<String, Value>) -> Value {
    let mut body = Map::new();
    body.insert("messages".to_string(), json!(messages));
    for (key, value) in params {
        body.insert(key.clone(), value.clone());
    }
    Value::Object(body)
}

fn body_len(messages: &[Message], params: &Map<String, Value>) -> usize {
    serde_json::to_vec(&add_payload(messages, params)).map_or(usize::MAX, |body| body.len())
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn empty_list() -> Value {
    Value::Array(Vec::new())
}
