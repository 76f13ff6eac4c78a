pub mod commands;
pub mod error;
pub mod logging;
pub mod output;

pub use commands::{ConfigCommand, MemoryCommand, StatusCommand};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, format_timestamp, mask_secret, truncate_string};
