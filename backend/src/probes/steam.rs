//! `steam` monitors: look the server up in the Steam master list.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{ping::icmp_ping, ProbeContext, ProbeDriver, ProbeError, ProbeOutcome};
use crate::db::models::{Heartbeat, Monitor};
use crate::monitor::status::Status;
use crate::version;

const STEAM_API_URL: &str = "https://api.steampowered.com/IGameServersService/GetServerList/v1/";

pub struct SteamDriver;

#[derive(Deserialize)]
struct ServerListEnvelope {
    #[serde(default)]
    response: ServerListBody,
}

#[derive(Deserialize, Default)]
struct ServerListBody {
    #[serde(default)]
    servers: Vec<SteamServer>,
}

#[derive(Deserialize)]
struct SteamServer {
    #[serde(default)]
    name: Option<String>,
}

#[async_trait]
impl ProbeDriver for SteamDriver {
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
            .ok_or_else(|| ProbeError::Config("Port is not configured".to_string()))?;
        let api_key = ctx
            .env
            .steam_api_key
            .as_deref()
            .ok_or_else(|| ProbeError::Config("Steam API key is not configured".to_string()))?;

        let filter = format!("addr\\{hostname}:{port}");
        let client = reqwest::Client::builder()
            .user_agent(version::http_user_agent())
            .build()
            .map_err(|e| ProbeError::Network(e.to_string()))?;

        let list: ServerListEnvelope = client
            .get(STEAM_API_URL)
            .query(&[("key", api_key), ("filter", filter.as_str())])
            .timeout(Duration::from_secs_f64(ctx.timeout))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ProbeError::Network(e.to_string()))?
            .json()
            .await
            .map_err(|e| ProbeError::Network(format!("Invalid Steam API response: {e}")))?;

        let Some(server) = list.response.servers.first() else {
            return Err(ProbeError::Predicate(
                "Server not found in Steam server list".to_string(),
            ));
        };

        beat.status = Status::Up;
        beat.msg = server.name.clone().unwrap_or_default();

        // Latency is nice to have; a blocked ICMP path must not fail the
        // beat.
        if let Ok(rtt) = icmp_ping(hostname, 56, Duration::from_secs_f64(ctx.timeout)).await {
            beat.ping = Some(rtt.as_millis() as f64);
        }
        Ok(ProbeOutcome::Beat)
    }
}
