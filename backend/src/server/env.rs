//! Immutable per-tick environment snapshot.
//!
//! Tick code never reads mutable globals: the supervisor refreshes the
//! handle from the settings store and every tick takes a cheap clone, so a
//! settings change applies to the next tick without racing a running one.

use std::sync::RwLock;

use sqlx::SqlitePool;
use tracing::warn;

use super::config::ServerConfig;
use crate::db::services as db;

pub const DEFAULT_TLS_EXPIRY_DAYS: [i64; 3] = [7, 14, 21];

#[derive(Debug, Clone)]
pub struct Env {
    pub demo_mode: bool,
    pub timezone: String,
    pub tls_expiry_days: Vec<i64>,
    pub steam_api_key: Option<String>,
}

impl Default for Env {
    fn default() -> Self {
        Env {
            demo_mode: false,
            timezone: "UTC".to_string(),
            tls_expiry_days: DEFAULT_TLS_EXPIRY_DAYS.to_vec(),
            steam_api_key: None,
        }
    }
}

pub struct EnvHandle {
    inner: RwLock<Env>,
}

impl EnvHandle {
    pub fn new(config: &ServerConfig) -> Self {
        let env = Env {
            demo_mode: config.demo_mode,
            steam_api_key: config.steam_api_key.clone(),
            ..Env::default()
        };
        EnvHandle {
            inner: RwLock::new(env),
        }
    }

    pub fn snapshot(&self) -> Env {
        self.inner.read().expect("env lock poisoned").clone()
    }

    /// Pulls the tunable parts back out of the settings store.
    pub async fn refresh(&self, pool: &SqlitePool) {
        let tls_expiry_days = match db::get_setting::<Vec<i64>>(pool, "tlsExpiryNotifyDays").await {
            Ok(Some(days)) if !days.is_empty() => days,
            Ok(_) => DEFAULT_TLS_EXPIRY_DAYS.to_vec(),
            Err(e) => {
                warn!(error = %e, "Failed to read tlsExpiryNotifyDays; keeping defaults.");
                DEFAULT_TLS_EXPIRY_DAYS.to_vec()
            }
        };
        let timezone = match db::get_setting::<String>(pool, "serverTimezone").await {
            Ok(Some(timezone)) if !timezone.is_empty() => timezone,
            _ => "UTC".to_string(),
        };

        let mut env = self.inner.write().expect("env lock poisoned");
        env.tls_expiry_days = tls_expiry_days;
        env.timezone = timezone;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_published_thresholds() {
        let env = Env::default();
        assert_eq!(env.tls_expiry_days, vec![7, 14, 21]);
        assert_eq!(env.timezone, "UTC");
        assert!(!env.demo_mode);
    }
}
