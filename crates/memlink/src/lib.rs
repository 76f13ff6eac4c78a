//! Memlink - resilient client for remote memory services
//!
//! This crate wraps a Mem0-compatible HTTP API with connection health
//! management, bounded retries with backoff, and chunked uploads for
//! payloads that exceed a single request's size budget.

pub mod chunker;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod retry;
pub mod testing;
pub mod transport;

pub use client::{ApiVersion, MemoryClient, MemoryInput, Message, RequestOptions, flatten_memories};
pub use config::Config;
pub use error::{MemlinkError, Result};
