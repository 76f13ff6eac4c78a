//! Connection health management
//!
//! The manager owns the transport and its health state; the monitor drives
//! periodic probes from a background task.

pub mod manager;
pub mod monitor;

pub use manager::{ConnectionManager, ConnectionSnapshot};
pub use monitor::{HealthMonitor, MonitorState};
