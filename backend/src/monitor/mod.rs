/// Configurable scheduling bounds for monitor intervals, in seconds.
pub const MIN_INTERVAL_SECOND: i64 = 20;
pub const MAX_INTERVAL_SECOND: i64 = 2_073_600;

pub mod group;
pub mod pre_command;
pub mod runtime;
pub mod status;
pub mod tls;
pub mod transition;
pub mod uptime;
