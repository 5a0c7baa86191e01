//! Library crate for host-scan-rs: single-host TCP connect scanning and ICMP ping statistics.
pub mod aggregator;
pub mod config;
pub mod error;
pub mod logging;
pub mod ping;
pub mod pipeline;
pub mod ports;
pub mod progress;
pub mod resolve;
pub mod scanner;
pub mod services;
pub mod types;

pub use error::ScanError;
