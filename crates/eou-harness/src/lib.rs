//! Record-driven driver and structured logging for eou ownership primitives.
//!
//! This crate provides:
//! - A driver that loads 8-byte records into a mixed stack/heap slot table
//! - An ownership audit of every heap acquisition and release
//! - Structured JSONL lifecycle logs

pub mod driver;
pub mod error;
pub mod structured_log;

pub use driver::{DriverConfig, DriverReport, StopReason, run};
pub use error::DriverError;
pub use structured_log::{LogEmitter, LogEntry, LogLevel, Storage, validate_log_line};
