use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;

use crate::monitor::status::Status;

/// A configured probe with its schedule and thresholds.
/// Corresponds to the `monitor` table. Protocol-specific columns are
/// nullable; each probe driver reads the subset it needs.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub monitor_type: String,
    pub active: bool,
    pub parent_id: Option<i64>,
    pub interval: i64,
    pub retry_interval: i64,
    pub resend_interval: i64,
    pub max_retries: i64,
    pub timeout: f64,
    pub upside_down: bool,

    pub url: Option<String>,
    pub method: String,
    pub headers: Option<String>,
    pub body: Option<String>,
    pub http_body_encoding: Option<String>,
    pub max_redirects: i64,
    pub accepted_statuscodes: String,
    pub ignore_tls: bool,
    pub expiry_notification: bool,
    pub check_content_parameter: bool,
    pub keyword: Option<String>,
    pub invert_keyword: bool,
    pub json_path: Option<String>,
    pub expected_value: Option<String>,
    pub proxy_url: Option<String>,

    pub auth_method: Option<String>,
    pub basic_auth_user: Option<String>,
    pub basic_auth_pass: Option<String>,
    pub oauth_token_url: Option<String>,
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret: Option<String>,
    pub oauth_scopes: Option<String>,
    pub oauth_auth_method: String,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub tls_ca: Option<String>,

    pub hostname: Option<String>,
    pub port: Option<i64>,
    pub packet_size: i64,

    pub dns_resolve_server: Option<String>,
    pub dns_resolve_server_port: i64,
    pub dns_resolve_type: Option<String>,
    pub dns_last_result: Option<String>,

    pub docker_container: Option<String>,
    pub docker_host: Option<String>,

    pub game: Option<String>,

    pub mqtt_topic: Option<String>,
    pub mqtt_success_message: Option<String>,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,

    pub kafka_producer_brokers: Option<String>,
    pub kafka_producer_topic: Option<String>,
    pub kafka_producer_message: Option<String>,

    pub radius_username: Option<String>,
    pub radius_password: Option<String>,
    pub radius_secret: Option<String>,
    pub radius_called_station_id: Option<String>,
    pub radius_calling_station_id: Option<String>,

    pub grpc_url: Option<String>,
    pub grpc_descriptor: Option<String>,
    pub grpc_service_name: Option<String>,
    pub grpc_method: Option<String>,
    pub grpc_body: Option<String>,
    pub grpc_enable_tls: bool,

    pub database_connection_string: Option<String>,
    pub database_query: Option<String>,

    pub push_token: Option<String>,

    pub pre_up_command: Option<String>,
    pub pre_down_command: Option<String>,
}

impl Monitor {
    /// Accepted status code items (`"200"`, `"2xx"`, `"200-299"`), parsed
    /// from the JSON column. An unreadable column falls back to `2xx`.
    pub fn accepted_statuscode_items(&self) -> Vec<String> {
        serde_json::from_str(&self.accepted_statuscodes)
            .unwrap_or_else(|_| vec!["200-299".to_string()])
    }

    /// Extra request headers from the JSON column.
    pub fn header_map(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        let raw = self.headers.as_deref()?;
        serde_json::from_str(raw).ok()
    }

    /// The sanitized JSON representation handed to notification payloads
    /// and pre-commands. Credentials and TLS material never leave here.
    pub fn public_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "name": self.name,
            "type": self.monitor_type,
            "url": self.url,
            "hostname": self.hostname,
            "port": self.port,
            "interval": self.interval,
            "active": self.active,
            "parentId": self.parent_id,
        })
    }
}

/// One probe outcome record. Append-only; `duration` is the gap in whole
/// seconds to the previous heartbeat of the same monitor.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub id: i64,
    pub monitor_id: i64,
    pub status: Status,
    pub time: DateTime<Utc>,
    pub msg: String,
    pub ping: Option<f64>,
    pub duration: i64,
    pub important: bool,
    pub down_count: i64,
}

impl Heartbeat {
    /// Fresh beat skeleton for one tick of `monitor_id`.
    pub fn new(monitor_id: i64, time: DateTime<Utc>) -> Heartbeat {
        Heartbeat {
            id: 0,
            monitor_id,
            status: Status::Down,
            time,
            msg: String::new(),
            ping: None,
            duration: 0,
            important: false,
            down_count: 0,
        }
    }
}

/// A notification channel row; `config` is the provider-specific JSON.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct NotificationChannel {
    pub id: i64,
    pub name: String,
    pub active: bool,
    pub config: String,
}

/// A maintenance window. A monitor linked to an active window (directly
/// or through an ancestor) beats as MAINTENANCE without probing.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Maintenance {
    pub id: i64,
    pub title: String,
    pub active: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor_fixture() -> Monitor {
        Monitor {
            id: 1,
            owner_id: 1,
            name: "example".into(),
            monitor_type: "http".into(),
            active: true,
            parent_id: None,
            interval: 60,
            retry_interval: 0,
            resend_interval: 0,
            max_retries: 0,
            timeout: 48.0,
            upside_down: false,
            url: Some("https://example.com".into()),
            method: "GET".into(),
            headers: Some(r#"{"X-Probe":"1"}"#.into()),
            body: None,
            http_body_encoding: None,
            max_redirects: 10,
            accepted_statuscodes: r#"["200-299"]"#.into(),
            ignore_tls: false,
            expiry_notification: false,
            check_content_parameter: false,
            keyword: None,
            invert_keyword: false,
            json_path: None,
            expected_value: None,
            proxy_url: None,
            auth_method: None,
            basic_auth_user: None,
            basic_auth_pass: Some("secret".into()),
            oauth_token_url: None,
            oauth_client_id: None,
            oauth_client_secret: None,
            oauth_scopes: None,
            oauth_auth_method: "client_secret_basic".into(),
            tls_cert: None,
            tls_key: None,
            tls_ca: None,
            hostname: None,
            port: None,
            packet_size: 56,
            dns_resolve_server: None,
            dns_resolve_server_port: 53,
            dns_resolve_type: None,
            dns_last_result: None,
            docker_container: None,
            docker_host: None,
            game: None,
            mqtt_topic: None,
            mqtt_success_message: None,
            mqtt_username: None,
            mqtt_password: None,
            kafka_producer_brokers: None,
            kafka_producer_topic: None,
            kafka_producer_message: None,
            radius_username: None,
            radius_password: None,
            radius_secret: None,
            radius_called_station_id: None,
            radius_calling_station_id: None,
            grpc_url: None,
            grpc_descriptor: None,
            grpc_service_name: None,
            grpc_method: None,
            grpc_body: None,
            grpc_enable_tls: false,
            database_connection_string: None,
            database_query: None,
            push_token: None,
            pre_up_command: None,
            pre_down_command: None,
        }
    }

    #[test]
    fn header_map_parses_json_column() {
        let monitor = monitor_fixture();
        let map = monitor.header_map().unwrap();
        assert_eq!(map.get("X-Probe").unwrap(), "1");
    }

    #[test]
    fn public_json_omits_credentials() {
        let rendered = monitor_fixture().public_json().to_string();
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("example.com"));
    }

    #[test]
    fn malformed_statuscodes_fall_back_to_2xx() {
        let mut monitor = monitor_fixture();
        monitor.accepted_statuscodes = "oops".into();
        assert_eq!(monitor.accepted_statuscode_items(), vec!["200-299"]);
    }
}
