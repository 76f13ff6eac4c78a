//! Error types for memlink

use thiserror::Error;

/// Main error type for memlink operations
#[derive(Error, Debug)]
pub enum MemlinkError {
    /// Configuration errors (bad values, missing credentials, unreadable files)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transient transport failures: timeouts, refused connections, resets
    #[error("Connection error: {0}")]
    Connection(String),

    /// The remote service answered with a well-formed error response
    #[error("Remote rejected request ({status}): {body}")]
    Remote { status: u16, body: String },

    /// Every retry attempt failed with a connection-class error
    #[error("Request failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<MemlinkError>,
    },

    /// A chunked upload stopped partway; earlier chunks are already stored remotely
    #[error("Chunked upload failed after {succeeded} of {total} chunks: {source}")]
    ChunkUpload {
        succeeded: usize,
        total: usize,
        #[source]
        source: Box<MemlinkError>,
    },

    /// Any other failure, surfaced without retry
    #[error("Request failed: {0}")]
    Unclassified(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The client has been closed
    #[error("Client is closed")]
    Closed,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemlinkError {
    /// Whether this failure is transient and worth retrying
    pub fn is_connection(&self) -> bool {
        matches!(self, MemlinkError::Connection(_))
    }

    /// Whether the remote service rejected the request
    pub fn is_remote(&self) -> bool {
        matches!(self, MemlinkError::Remote { .. })
    }
}

impl From<reqwest::Error> for MemlinkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
            MemlinkError::Connection(e.to_string())
        } else if let Some(status) = e.status() {
            MemlinkError::Remote {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else if e.is_builder() {
            MemlinkError::Config(e.to_string())
        } else {
            MemlinkError::Unclassified(e.to_string())
        }
    }
}

impl From<serde_json::Error> for MemlinkError {
    fn from(e: serde_json::Error) -> Self {
        MemlinkError::Serialization(e.to_string())
    }
}

/// Result type alias for memlink operations
pub type Result<T> = std::result::Result<T, MemlinkError>;
