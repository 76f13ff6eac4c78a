pub mod config;
pub mod memory;
pub mod status;

pub use config::ConfigCommand;
pub use memory::MemoryCommand;
pub use status::StatusCommand;

/// User id attached to requests that do not name one
pub const DEFAULT_USER_ID: &str = "memlink_cli";
