//! `port` monitors: plain TCP connect.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::{ProbeContext, ProbeDriver, ProbeError, ProbeOutcome};
use crate::db::models::{Heartbeat, Monitor};
use crate::monitor::status::Status;

pub struct TcpDriver;

#[async_trait]
impl ProbeDriver for TcpDriver {
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
        let port = monitor
            .port
            .ok_or_else(|| ProbeError::Config("Port is not configured".to_string()))?
            as u16;

        let started = Instant::now();
        let connect = TcpStream::connect((hostname, port));
        match tokio::time::timeout(Duration::from_secs_f64(ctx.timeout), connect).await {
            Ok(Ok(_stream)) => {
                beat.ping = Some(started.elapsed().as_millis() as f64);
                beat.status = Status::Up;
                beat.msg = "Connection successful".to_string();
                Ok(ProbeOutcome::Beat)
            }
            Ok(Err(e)) => Err(ProbeError::Network(e.to_string())),
            Err(_) => Err(ProbeError::Network("Connection timed out".to_string())),
        }
    }
}
