//! `push` monitors: no outbound probe. An external agent posts heartbeats
//! through the push endpoint; this driver only asserts that one arrived
//! inside the expected window.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{ProbeContext, ProbeDriver, ProbeError, ProbeOutcome};
use crate::db::models::{Heartbeat, Monitor};
use crate::db::services as db;
use crate::monitor::status::Status;

/// Grace period on top of the beat interval before a push monitor is
/// considered silent.
pub const PUSH_BUFFER_MS: i64 = 1000;

pub struct PushDriver;

#[async_trait]
impl ProbeDriver for PushDriver {
    async fn check(
        &self,
        monitor: &Monitor,
        _beat: &mut Heartbeat,
        ctx: &ProbeContext<'_>,
    ) -> Result<ProbeOutcome, ProbeError> {
        let latest = db::find_latest(ctx.pool, monitor.id).await?;

        if let Some(previous) = latest {
            // Only a previous UP beat counts as a live signal; a DOWN row
            // in the window must not silence the failure.
            if previous.status == Status::Up {
                let elapsed_ms = (Utc::now() - previous.time).num_milliseconds();
                let window_ms = ctx.beat_interval as i64 * 1000 + PUSH_BUFFER_MS;
                if elapsed_ms <= window_ms {
                    // The agent already wrote this period's heartbeat; do
                    // not add a synthetic one, just wait out the rest of
                    // the window.
                    let remaining_ms = (window_ms - elapsed_ms).max(0) as u64;
                    return Ok(ProbeOutcome::Defer(Duration::from_millis(remaining_ms)));
                }
            }
        }

        Err(ProbeError::Network(
            "No heartbeat in the time window".to_string(),
        ))
    }
}
