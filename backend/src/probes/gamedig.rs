//! `gamedig` monitors: query a game server using its gamedig game id.

use std::time::Instant;

use async_trait::async_trait;

use super::{ProbeContext, ProbeDriver, ProbeError, ProbeOutcome};
use crate::db::models::{Heartbeat, Monitor};
use crate::monitor::status::Status;

pub struct GamedigDriver;

#[async_trait]
impl ProbeDriver for GamedigDriver {
    async fn check(
        &self,
        monitor: &Monitor,
        beat: &mut Heartbeat,
        _ctx: &ProbeContext<'_>,
    ) -> Result<ProbeOutcome, ProbeError> {
        let game_id = monitor
            .game
            .as_deref()
            .ok_or_else(|| ProbeError::Config("Game is not configured".to_string()))?;
        let hostname = monitor
            .hostname
            .as_deref()
            .ok_or_else(|| ProbeError::Config("Hostname is not configured".to_string()))?;
        let port = monitor.port.map(|port| port as u16);

        let game = ::gamedig::GAMES
            .get(game_id)
            .ok_or_else(|| ProbeError::Config(format!("Unknown game: {game_id}")))?;

        let ip = super::ping::resolve(hostname).await?;
        let started = Instant::now();
        // The gamedig protocol implementations are synchronous.
        let result = tokio::task::spawn_blocking(move || {
            ::gamedig::query(game, &ip, port)
                .map(|_response| ())
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| ProbeError::Network(format!("Query task failed: {e}")))?;

        match result {
            Ok(()) => {
                beat.ping = Some(started.elapsed().as_millis() as f64);
                beat.status = Status::Up;
                beat.msg = "Server is online".to_string();
                Ok(ProbeOutcome::Beat)
            }
            Err(e) => Err(ProbeError::Network(e)),
        }
    }
}
