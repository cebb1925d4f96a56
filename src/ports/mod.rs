//! Port traits the core depends on; adapters implement them.

pub mod config_port;
pub mod data_port;
pub mod report_port;
pub mod strategy_store;
