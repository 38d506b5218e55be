//! `ping` monitors: ICMP echo.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use rand::random;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, ICMP};

use super::{ProbeContext, ProbeDriver, ProbeError, ProbeOutcome};
use crate::db::models::{Heartbeat, Monitor};
use crate::monitor::status::Status;

pub struct PingDriver;

#[async_trait]
impl ProbeDriver for PingDriver {
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
        let packet_size = monitor.packet_size.clamp(0, 65500) as usize;

        let rtt = icmp_ping(
            hostname,
            packet_size,
            Duration::from_secs_f64(ctx.timeout),
        )
        .await?;
        beat.ping = Some(rtt.as_millis() as f64);
        beat.status = Status::Up;
        beat.msg = format!("{} ms", rtt.as_millis());
        Ok(ProbeOutcome::Beat)
    }
}

/// One echo round trip, shared with the Steam driver's latency probe.
pub(crate) async fn icmp_ping(
    hostname: &str,
    packet_size: usize,
    timeout: Duration,
) -> Result<Duration, ProbeError> {
    let ip = resolve(hostname).await?;
    let config = match ip {
        IpAddr::V4(_) => Config::default(),
        IpAddr::V6(_) => Config::builder().kind(ICMP::V6).build(),
    };
    let client = Client::new(&config)?;
    let mut pinger = client.pinger(ip, PingIdentifier(random())).await;
    pinger.timeout(timeout);

    let payload = vec![0u8; packet_size];
    match pinger.ping(PingSequence(0), &payload).await {
        Ok((_reply, rtt)) => Ok(rtt),
        Err(e) => Err(ProbeError::Network(e.to_string())),
    }
}

pub(crate) async fn resolve(hostname: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = hostname.parse::<IpAddr>() {
        return Ok(ip);
    }
    tokio::net::lookup_host((hostname, 0))
        .await?
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| ProbeError::Network(format!("No address found for {hostname}")))
}
