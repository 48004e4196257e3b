//! # stashsort-service
//!
//! Service layer for stashsort.
//!
//! This crate provides:
//! - Layered configuration (defaults, YAML file, environment)
//! - Snapshot entry points over the capture-fed cache
//! - Blocking and threaded sorts with cooperative cancellation
//! - Capture start/stop/restart and status

pub mod config;
pub mod error;
pub mod service;

pub use config::{CaptureConfig, Config, ConfigError, ProtocolConfig, SortConfig, StorageConfig};
pub use error::ServiceError;
pub use service::{SortHandle, StashService};
