//! `docker` monitors: container state via the Docker Engine API.

use std::time::Instant;

use async_trait::async_trait;
use bollard::container::InspectContainerOptions;
use bollard::models::HealthStatusEnum;
use bollard::{Docker, API_DEFAULT_VERSION};

use super::{ProbeContext, ProbeDriver, ProbeError, ProbeOutcome};
use crate::db::models::{Heartbeat, Monitor};
use crate::monitor::status::Status;

pub struct DockerDriver;

#[async_trait]
impl ProbeDriver for DockerDriver {
    async fn check(
        &self,
        monitor: &Monitor,
        beat: &mut Heartbeat,
        ctx: &ProbeContext<'_>,
    ) -> Result<ProbeOutcome, ProbeError> {
        let container = monitor
            .docker_container
            .as_deref()
            .ok_or_else(|| ProbeError::Config("Container is not configured".to_string()))?;
        let host = monitor
            .docker_host
            .as_deref()
            .unwrap_or("unix:///var/run/docker.sock");
        // A mutually-authenticated daemon socket needs the OpenSSL-backed
        // client this crate does not link; refuse it loudly instead of
        // dialing plaintext against a TLS port.
        if host.starts_with("https://") {
            return Err(ProbeError::Config(
                "TLS Docker hosts are not supported; use the unix socket or plain tcp".to_string(),
            ));
        }
        let timeout_secs = ctx.timeout.max(1.0) as u64;

        let docker = if host.starts_with("unix://") {
            Docker::connect_with_unix(host, timeout_secs, API_DEFAULT_VERSION)
        } else {
            Docker::connect_with_http(host, timeout_secs, API_DEFAULT_VERSION)
        }
        .map_err(|e| ProbeError::Network(e.to_string()))?;

        let started = Instant::now();
        let inspect = docker
            .inspect_container(container, None::<InspectContainerOptions>)
            .await
            .map_err(|e| ProbeError::Network(e.to_string()))?;
        beat.ping = Some(started.elapsed().as_millis() as f64);

        let state = inspect
            .state
            .ok_or_else(|| ProbeError::Network("Container state missing".to_string()))?;
        if !state.running.unwrap_or(false) {
            return Err(ProbeError::Predicate(
                "Container state is not running".to_string(),
            ));
        }

        match state.health.and_then(|health| health.status) {
            None | Some(HealthStatusEnum::NONE) | Some(HealthStatusEnum::EMPTY) => {
                beat.status = Status::Up;
                beat.msg = "running".to_string();
            }
            Some(HealthStatusEnum::HEALTHY) => {
                beat.status = Status::Up;
                beat.msg = "healthy".to_string();
            }
            // Running but not (yet) healthy: report PENDING, not DOWN.
            Some(other) => {
                beat.status = Status::Pending;
                beat.msg = format!("Container health: {other:?}").to_lowercase();
            }
        }
        Ok(ProbeOutcome::Beat)
    }
}
