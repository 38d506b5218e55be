//! High-level data access over the SQLite store. Each sub-module covers
//! one domain area; everything is re-exported here so callers use
//! `crate::db::services::*` without caring about the split.

pub mod heartbeat_service;
pub mod monitor_service;
pub mod notification_service;
pub mod settings_service;
pub mod tls_service;

pub use heartbeat_service::*;
pub use monitor_service::*;
pub use notification_service::*;
pub use settings_service::*;
pub use tls_service::*;
