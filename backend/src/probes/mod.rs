//! Probe drivers and the type registry that dispatches to them.
//!
//! Each monitor type maps to one driver. A driver either mutates the beat
//! to UP/PENDING (message, ping) and returns [`ProbeOutcome::Beat`], defers
//! the beat entirely ([`ProbeOutcome::Defer`], push monitors), or fails
//! with a [`ProbeError`] that the runtime turns into PENDING/DOWN through
//! retry accounting.

pub mod database;
pub mod dns;
pub mod docker;
pub mod gamedig;
pub mod grpc;
pub mod http;
pub mod kafka;
pub mod mqtt;
pub mod ping;
pub mod push;
pub mod radius;
pub mod steam;
pub mod tcp;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::db::models::{Heartbeat, Monitor};
use crate::monitor::tls::TlsInfo;
use crate::server::env::Env;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Unknown Monitor Type")]
    UnknownType,
    /// Broken or missing configuration; surfaces as the DOWN reason and is
    /// retried like any other failure.
    #[error("{0}")]
    Config(String),
    /// The endpoint answered, but not the way the monitor demands
    /// (keyword mismatch, JSON query mismatch, unhealthy container, …).
    #[error("{0}")]
    Predicate(String),
    #[error("{0}")]
    Network(String),
    /// The probe ran into the outer cancellation bound.
    #[error("timeout by AbortSignal ({0}s)")]
    Timeout(f64),
}

impl From<reqwest::Error> for ProbeError {
    fn from(e: reqwest::Error) -> Self {
        ProbeError::Network(e.to_string())
    }
}

impl From<sqlx::Error> for ProbeError {
    fn from(e: sqlx::Error) -> Self {
        ProbeError::Network(e.to_string())
    }
}

impl From<std::io::Error> for ProbeError {
    fn from(e: std::io::Error) -> Self {
        ProbeError::Network(e.to_string())
    }
}

/// What the runtime should do with the beat after a successful check.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// The beat was filled in and follows the normal pipeline.
    Beat,
    /// No beat this tick; schedule the next one after the given delay.
    /// Used by push monitors that found a fresh external heartbeat.
    Defer(Duration),
}

/// Cached OAuth2 client-credentials token of one monitor.
#[derive(Debug, Clone)]
pub struct OauthToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl OauthToken {
    pub fn expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Everything a driver may need besides the monitor row itself.
pub struct ProbeContext<'a> {
    pub pool: &'a SqlitePool,
    pub env: &'a Env,
    /// Normalized beat interval of the running tick, in seconds.
    pub beat_interval: u64,
    /// Probe-internal timeout in seconds; the runtime enforces a hard
    /// bound of `timeout + 10` on top.
    pub timeout: f64,
    /// Per-monitor OAuth2 token cache, survives across ticks.
    pub oauth_token: &'a tokio::sync::Mutex<Option<OauthToken>>,
    /// Chain captured during this tick's TLS handshake, if any. The
    /// runtime hands it to the TLS tracker after the probe returns.
    pub tls_info: Mutex<Option<TlsInfo>>,
}

#[async_trait]
pub trait ProbeDriver: Send + Sync {
    async fn check(
        &self,
        monitor: &Monitor,
        beat: &mut Heartbeat,
        ctx: &ProbeContext<'_>,
    ) -> Result<ProbeOutcome, ProbeError>;
}

/// Maps `monitor.monitor_type` to its driver. Adding a type is a single
/// `register` call; nothing else branches on the type string.
pub struct ProbeRegistry {
    drivers: HashMap<&'static str, Box<dyn ProbeDriver>>,
}

impl ProbeRegistry {
    pub fn empty() -> Self {
        ProbeRegistry {
            drivers: HashMap::new(),
        }
    }

    pub fn with_builtin_drivers() -> Self {
        let mut registry = Self::empty();
        registry.register("http", Box::new(http::HttpDriver));
        registry.register("keyword", Box::new(http::HttpDriver));
        registry.register("json-query", Box::new(http::HttpDriver));
        registry.register("port", Box::new(tcp::TcpDriver));
        registry.register("ping", Box::new(ping::PingDriver));
        registry.register("dns", Box::new(dns::DnsDriver));
        registry.register("push", Box::new(push::PushDriver));
        registry.register("steam", Box::new(steam::SteamDriver));
        registry.register("gamedig", Box::new(gamedig::GamedigDriver));
        registry.register("docker", Box::new(docker::DockerDriver));
        registry.register("mqtt", Box::new(mqtt::MqttDriver));
        registry.register("sqlserver", Box::new(database::SqlServerDriver));
        registry.register("postgres", Box::new(database::PostgresDriver));
        registry.register("mysql", Box::new(database::MysqlDriver));
        registry.register("mongodb", Box::new(database::MongoDriver));
        registry.register("redis", Box::new(database::RedisDriver));
        registry.register("radius", Box::new(radius::RadiusDriver));
        registry.register("grpc-keyword", Box::new(grpc::GrpcKeywordDriver));
        registry.register("kafka-producer", Box::new(kafka::KafkaProducerDriver));
        registry.register("group", Box::new(crate::monitor::group::GroupDriver));
        registry
    }

    pub fn register(&mut self, monitor_type: &'static str, driver: Box<dyn ProbeDriver>) {
        self.drivers.insert(monitor_type, driver);
    }

    pub fn driver_for(&self, monitor_type: &str) -> Option<&dyn ProbeDriver> {
        self.drivers.get(monitor_type).map(|boxed| boxed.as_ref())
    }
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::with_builtin_drivers()
    }
}

/// Shared keyword predicate: the check passes when keyword presence
/// matches the non-inverted expectation.
pub(crate) fn keyword_matches(haystack: &str, keyword: &str, invert: bool) -> bool {
    haystack.contains(keyword) != invert
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_every_builtin_type() {
        let registry = ProbeRegistry::with_builtin_drivers();
        for monitor_type in [
            "http",
            "keyword",
            "json-query",
            "port",
            "ping",
            "dns",
            "push",
            "steam",
            "gamedig",
            "docker",
            "mqtt",
            "sqlserver",
            "postgres",
            "mysql",
            "mongodb",
            "redis",
            "radius",
            "grpc-keyword",
            "kafka-producer",
            "group",
        ] {
            assert!(
                registry.driver_for(monitor_type).is_some(),
                "missing driver for {monitor_type}"
            );
        }
        assert!(registry.driver_for("carrier-pigeon").is_none());
    }

    #[test]
    fn keyword_predicate_is_xor_with_invert() {
        assert!(keyword_matches("hello world", "world", false));
        assert!(!keyword_matches("hello world", "world", true));
        assert!(!keyword_matches("hello world", "mars", false));
        assert!(keyword_matches("hello world", "mars", true));
    }

    #[test]
    fn timeout_error_renders_canonical_message() {
        let error = ProbeError::Timeout(48.0);
        assert_eq!(error.to_string(), "timeout by AbortSignal (48s)");
    }
}
