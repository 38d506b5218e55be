//! TLS certificate capture and expiry tracking.
//!
//! HTTPS probes cannot read the peer chain back out of the HTTP client, so
//! the chain is captured with a dedicated handshake using the standard TLS
//! API. Verification is intentionally disabled for the capture connection:
//! an expired or otherwise invalid chain must still be observable, and the
//! probe connection already enforced verification when `ignore_tls` is off.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};
use x509_parser::prelude::*;

use crate::db::models::Monitor;
use crate::db::services as db;
use crate::db::services::tls_service::CERTIFICATE_HISTORY_TYPE;
use crate::notifications::service::NotificationService;
use crate::server::env::Env;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("connect failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("TLS handshake failed: {0}")]
    Handshake(String),
    #[error("certificate parse failed: {0}")]
    Parse(String),
    #[error("connection timed out")]
    Timeout,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Info about one certificate in the presented chain. `issuer_certificate`
/// links towards the root, mirroring the chain order on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertInfo {
    pub subject_cn: String,
    pub issuer_cn: String,
    pub cert_type: String,
    pub fingerprint256: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub days_remaining: i64,
    pub valid: bool,
    pub issuer_certificate: Option<Box<CertInfo>>,
}

/// The per-monitor TLS snapshot stored in `monitor_tls_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsInfo {
    pub valid: bool,
    pub cert_info: Option<CertInfo>,
}

/// Accepts any presented certificate. Capture-only; never used for probe
/// traffic.
#[derive(Debug)]
struct CaptureVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for CaptureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Connects to `hostname:port`, completes a handshake and returns the
/// parsed peer chain.
pub async fn collect_tls_info(
    hostname: &str,
    port: u16,
    timeout: Duration,
) -> Result<TlsInfo, TlsError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| TlsError::Handshake(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(CaptureVerifier { provider }))
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let tcp = tokio::time::timeout(timeout, TcpStream::connect((hostname, port)))
        .await
        .map_err(|_| TlsError::Timeout)??;
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|e| TlsError::Handshake(e.to_string()))?;
    let stream = tokio::time::timeout(timeout, connector.connect(server_name, tcp))
        .await
        .map_err(|_| TlsError::Timeout)?
        .map_err(|e| TlsError::Handshake(e.to_string()))?;

    let (_, session) = stream.get_ref();
    let chain: Vec<Vec<u8>> = session
        .peer_certificates()
        .unwrap_or_default()
        .iter()
        .map(|der| der.as_ref().to_vec())
        .collect();
    parse_chain(&chain)
}

/// Builds the linked [`CertInfo`] chain out of DER certificates in wire
/// order (leaf first).
pub fn parse_chain(ders: &[Vec<u8>]) -> Result<TlsInfo, TlsError> {
    let now = Utc::now();
    let mut infos: Vec<CertInfo> = Vec::with_capacity(ders.len());

    for (index, der) in ders.iter().enumerate() {
        let (_, cert) =
            X509Certificate::from_der(der).map_err(|e| TlsError::Parse(e.to_string()))?;

        let subject_cn = common_name(cert.subject());
        let issuer_cn = common_name(cert.issuer());
        let self_signed = cert.subject().as_raw() == cert.issuer().as_raw();

        let valid_from = DateTime::from_timestamp(cert.validity().not_before.timestamp(), 0)
            .unwrap_or_default();
        let valid_to =
            DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0).unwrap_or_default();
        let days_remaining = (valid_to - now).num_days();
        let valid = cert.validity().is_valid();

        infos.push(CertInfo {
            subject_cn,
            issuer_cn,
            cert_type: cert_type(index, self_signed).to_string(),
            fingerprint256: fingerprint256(der),
            valid_from,
            valid_to,
            days_remaining,
            valid,
            issuer_certificate: None,
        });
    }

    let valid = !infos.is_empty() && infos.iter().all(|c| c.valid);
    let mut linked: Option<Box<CertInfo>> = None;
    for info in infos.into_iter().rev() {
        let mut info = info;
        info.issuer_certificate = linked.take();
        linked = Some(Box::new(info));
    }

    Ok(TlsInfo {
        valid,
        cert_info: linked.map(|boxed| *boxed),
    })
}

fn common_name(name: &X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn cert_type(chain_index: usize, self_signed: bool) -> &'static str {
    if chain_index == 0 {
        "server"
    } else if self_signed {
        "root CA"
    } else {
        "intermediate CA"
    }
}

/// SHA-256 over the DER encoding, colon-separated uppercase hex. This is
/// the identity used for rotation detection and notification dedup.
pub fn fingerprint256(der: &[u8]) -> String {
    let digest = Sha256::digest(der);
    digest
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Expiry thresholds are evaluated widest-first so that a certificate
/// crossing several thresholds at once records one row per threshold.
fn thresholds_descending(days: &[i64]) -> Vec<i64> {
    let mut sorted = days.to_vec();
    sorted.sort_unstable();
    sorted.reverse();
    sorted
}

/// Stores the captured chain and runs the expiry-notification flow.
///
/// A changed leaf fingerprint erases the send-history rows first, so a
/// rotated certificate starts with a clean dedup slate.
pub async fn handle_tls_info(
    pool: &SqlitePool,
    notifications: &NotificationService,
    monitor: &Monitor,
    tls: &TlsInfo,
    env: &Env,
) -> Result<(), TlsError> {
    let previous = db::find_tls_info(pool, monitor.id).await?;
    let previous_fingerprint = previous
        .as_ref()
        .and_then(|info| info["certInfo"]["fingerprint256"].as_str())
        .map(str::to_owned);
    let current_fingerprint = tls.cert_info.as_ref().map(|c| c.fingerprint256.clone());

    if previous_fingerprint.is_some() && previous_fingerprint != current_fingerprint {
        info!(monitor_id = monitor.id, "Leaf certificate changed, resetting expiry send history.");
        db::clear_certificate_history(pool, monitor.id).await?;
    }

    db::upsert_tls_info(pool, monitor.id, &serde_json::to_value(tls)?).await?;

    if !monitor.ignore_tls && monitor.expiry_notification {
        check_cert_expiry(pool, notifications, monitor, tls, env).await?;
    }
    Ok(())
}

async fn check_cert_expiry(
    pool: &SqlitePool,
    notifications: &NotificationService,
    monitor: &Monitor,
    tls: &TlsInfo,
    env: &Env,
) -> Result<(), TlsError> {
    let thresholds = thresholds_descending(&env.tls_expiry_days);
    let mut cert = tls.cert_info.as_ref();

    while let Some(info) = cert {
        // Root CAs expire on their own schedule and are not actionable.
        if info.cert_type != "root CA" {
            for &threshold in &thresholds {
                if info.days_remaining > threshold {
                    continue;
                }
                if db::has_notification_sent(pool, CERTIFICATE_HISTORY_TYPE, monitor.id, threshold)
                    .await?
                {
                    debug!(
                        monitor_id = monitor.id,
                        threshold, "Expiry notification already sent for this window."
                    );
                    continue;
                }
                let text = format!(
                    "[{}][{}] {} certificate {} will be expired in {} days",
                    monitor.name,
                    monitor.url.as_deref().unwrap_or(""),
                    info.cert_type,
                    info.subject_cn,
                    info.days_remaining
                );
                notifications.send_to_monitor_channels(monitor, &text, None).await;
                db::record_notification_sent(pool, CERTIFICATE_HISTORY_TYPE, monitor.id, threshold)
                    .await?;
            }
        }
        cert = info.issuer_certificate.as_deref();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_colon_separated_uppercase() {
        let fp = fingerprint256(b"der bytes");
        assert_eq!(fp.len(), 32 * 3 - 1);
        assert!(fp.split(':').all(|b| b.len() == 2));
        assert_eq!(fp, fp.to_uppercase());
    }

    #[test]
    fn thresholds_are_evaluated_widest_first() {
        assert_eq!(thresholds_descending(&[7, 21, 14]), vec![21, 14, 7]);
    }

    #[test]
    fn chain_positions_classify_cert_type() {
        assert_eq!(cert_type(0, false), "server");
        assert_eq!(cert_type(0, true), "server");
        assert_eq!(cert_type(1, false), "intermediate CA");
        assert_eq!(cert_type(2, true), "root CA");
    }
}
