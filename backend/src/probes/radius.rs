//! `radius` monitors: a PAP Access-Request, UP on Access-Accept.
//!
//! RFC 2865 only needs a handful of bytes here, assembled directly over
//! UDP: code, identifier, a random request authenticator and the
//! user/station attributes with the MD5-hidden password.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use md5::{Digest, Md5};
use tokio::net::UdpSocket;

use super::{ProbeContext, ProbeDriver, ProbeError, ProbeOutcome};
use crate::db::models::{Heartbeat, Monitor};
use crate::monitor::status::Status;

const CODE_ACCESS_REQUEST: u8 = 1;
const CODE_ACCESS_ACCEPT: u8 = 2;
const CODE_ACCESS_REJECT: u8 = 3;

const ATTR_USER_NAME: u8 = 1;
const ATTR_USER_PASSWORD: u8 = 2;
const ATTR_CALLED_STATION_ID: u8 = 30;
const ATTR_CALLING_STATION_ID: u8 = 31;
const ATTR_NAS_IDENTIFIER: u8 = 32;

const DEFAULT_PORT: i64 = 1812;

pub struct RadiusDriver;

#[async_trait]
impl ProbeDriver for RadiusDriver {
    async fn check(
        &self,
        monitor: &Monitor,
        beat: &mut Heartbeat,
        ctx: &ProbeContext<'_>,
    ) -> Result<ProbeOutcome, ProbeError> {
        let hostname = monitor
            .hostname
            .as_deref()
            .ok_or_else(|| ProbeError::Config("Hostname is not configured".to_string()))?;
        let port = monitor.port.unwrap_or(DEFAULT_PORT) as u16;
        let secret = monitor
            .radius_secret
            .as_deref()
            .ok_or_else(|| ProbeError::Config("RADIUS secret is not configured".to_string()))?;
        let username = monitor
            .radius_username
            .as_deref()
            .ok_or_else(|| ProbeError::Config("RADIUS username is not configured".to_string()))?;
        let password = monitor
            .radius_password
            .as_deref()
            .ok_or_else(|| ProbeError::Config("RADIUS password is not configured".to_string()))?;

        let identifier: u8 = rand::random();
        let authenticator: [u8; 16] = rand::random();

        let mut attributes = Vec::new();
        push_attribute(&mut attributes, ATTR_USER_NAME, username.as_bytes());
        push_attribute(
            &mut attributes,
            ATTR_USER_PASSWORD,
            &hide_password(password.as_bytes(), secret.as_bytes(), &authenticator),
        );
        push_attribute(&mut attributes, ATTR_NAS_IDENTIFIER, b"pulsewatch");
        if let Some(called) = monitor.radius_called_station_id.as_deref() {
            push_attribute(&mut attributes, ATTR_CALLED_STATION_ID, called.as_bytes());
        }
        if let Some(calling) = monitor.radius_calling_station_id.as_deref() {
            push_attribute(&mut attributes, ATTR_CALLING_STATION_ID, calling.as_bytes());
        }

        let request = encode_packet(CODE_ACCESS_REQUEST, identifier, &authenticator, &attributes);

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let started = Instant::now();
        socket.send_to(&request, (hostname, port)).await?;

        let mut buffer = [0u8; 4096];
        let (len, _) = tokio::time::timeout(
            Duration::from_secs_f64(ctx.timeout),
            socket.recv_from(&mut buffer),
        )
        .await
        .map_err(|_| ProbeError::Network("RADIUS request timed out".to_string()))??;

        if len < 20 {
            return Err(ProbeError::Network("Short RADIUS response".to_string()));
        }
        if buffer[1] != identifier {
            return Err(ProbeError::Network(
                "RADIUS response identifier mismatch".to_string(),
            ));
        }

        match buffer[0] {
            CODE_ACCESS_ACCEPT => {
                beat.ping = Some(started.elapsed().as_millis() as f64);
                beat.status = Status::Up;
                beat.msg = "Access-Accept".to_string();
                Ok(ProbeOutcome::Beat)
            }
            CODE_ACCESS_REJECT => Err(ProbeError::Predicate("Access-Reject".to_string())),
            other => Err(ProbeError::Network(format!(
                "Unexpected RADIUS response code {other}"
            ))),
        }
    }
}

fn encode_packet(code: u8, identifier: u8, authenticator: &[u8; 16], attributes: &[u8]) -> Vec<u8> {
    let length = (20 + attributes.len()) as u16;
    let mut packet = Vec::with_capacity(length as usize);
    packet.push(code);
    packet.push(identifier);
    packet.extend_from_slice(&length.to_be_bytes());
    packet.extend_from_slice(authenticator);
    packet.extend_from_slice(attributes);
    packet
}

fn push_attribute(out: &mut Vec<u8>, attribute_type: u8, value: &[u8]) {
    // Attribute length is one byte and includes the two header bytes.
    let value = &value[..value.len().min(253)];
    out.push(attribute_type);
    out.push((value.len() + 2) as u8);
    out.extend_from_slice(value);
}

/// RFC 2865 §5.2 User-Password hiding: the padded password is XORed
/// block-wise with an MD5 keystream chained over the shared secret.
fn hide_password(password: &[u8], secret: &[u8], authenticator: &[u8; 16]) -> Vec<u8> {
    let mut padded = password.to_vec();
    let padded_len = padded.len().div_ceil(16).max(1) * 16;
    padded.resize(padded_len, 0);

    let mut hidden = Vec::with_capacity(padded_len);
    let mut previous: Vec<u8> = authenticator.to_vec();
    for block in padded.chunks(16) {
        let mut hasher = Md5::new();
        hasher.update(secret);
        hasher.update(&previous);
        let keystream = hasher.finalize();

        let mut encrypted = [0u8; 16];
        for (index, (byte, key)) in block.iter().zip(keystream.iter()).enumerate() {
            encrypted[index] = byte ^ key;
        }
        hidden.extend_from_slice(&encrypted);
        previous = encrypted.to_vec();
    }
    hidden
}
