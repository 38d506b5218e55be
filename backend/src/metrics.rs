//! Per-monitor gauges in the shared Prometheus registry.

use lazy_static::lazy_static;
use prometheus::{register_gauge_vec, register_int_gauge_vec, GaugeVec, IntGaugeVec};

use crate::db::models::{Heartbeat, Monitor};
use crate::monitor::tls::TlsInfo;

const LABELS: [&str; 3] = ["monitor_id", "monitor_name", "monitor_type"];

lazy_static! {
    static ref MONITOR_STATUS: IntGaugeVec = register_int_gauge_vec!(
        "monitor_status",
        "Monitor status (0=down, 1=up, 2=pending, 3=maintenance)",
        &LABELS
    )
    .unwrap();
    static ref MONITOR_RESPONSE_TIME: GaugeVec = register_gauge_vec!(
        "monitor_response_time_ms",
        "Last probe round trip in milliseconds (-1 without a measurement)",
        &LABELS
    )
    .unwrap();
    static ref MONITOR_CERT_DAYS_REMAINING: IntGaugeVec = register_int_gauge_vec!(
        "monitor_cert_days_remaining",
        "Days until the served leaf certificate expires",
        &LABELS
    )
    .unwrap();
    static ref MONITOR_CERT_IS_VALID: IntGaugeVec = register_int_gauge_vec!(
        "monitor_cert_is_valid",
        "Whether the served certificate chain is within its validity window",
        &LABELS
    )
    .unwrap();
}

#[derive(Default)]
pub struct MetricsSink;

impl MetricsSink {
    pub fn new() -> Self {
        MetricsSink
    }

    pub fn update(&self, monitor: &Monitor, beat: &Heartbeat, tls: Option<&TlsInfo>) {
        let id = monitor.id.to_string();
        let labels = [id.as_str(), monitor.name.as_str(), monitor.monitor_type.as_str()];

        MONITOR_STATUS
            .with_label_values(&labels)
            .set(beat.status as i64);
        MONITOR_RESPONSE_TIME
            .with_label_values(&labels)
            .set(beat.ping.unwrap_or(-1.0));

        if let Some(tls) = tls {
            MONITOR_CERT_IS_VALID
                .with_label_values(&labels)
                .set(tls.valid as i64);
            if let Some(cert) = &tls.cert_info {
                MONITOR_CERT_DAYS_REMAINING
                    .with_label_values(&labels)
                    .set(cert.days_remaining);
            }
        }
    }

    /// Clears the series of a stopped or deleted monitor.
    pub fn remove(&self, monitor: &Monitor) {
        let id = monitor.id.to_string();
        let labels = [id.as_str(), monitor.name.as_str(), monitor.monitor_type.as_str()];
        let _ = MONITOR_STATUS.remove_label_values(&labels);
        let _ = MONITOR_RESPONSE_TIME.remove_label_values(&labels);
        let _ = MONITOR_CERT_DAYS_REMAINING.remove_label_values(&labels);
        let _ = MONITOR_CERT_IS_VALID.remove_label_values(&labels);
    }
}
