//! Aggregate status for group monitors.
//!
//! A group never probes the network. Its status derives from the latest
//! heartbeat of each active direct child; children that are themselves
//! groups contribute the status their own beat loop produced.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db::models::{Heartbeat, Monitor};
use crate::db::services as db;
use crate::monitor::status::Status;
use crate::probes::{ProbeContext, ProbeDriver, ProbeError, ProbeOutcome};

pub const MSG_ALL_UP: &str = "All children up and running";
pub const MSG_CHILD_INACCESSIBLE: &str = "Child inaccessible";
pub const MSG_GROUP_EMPTY: &str = "Group empty";

/// Computes the aggregate `(status, message)` of a group monitor.
pub async fn resolve_group(
    pool: &SqlitePool,
    monitor: &Monitor,
) -> Result<(Status, String), sqlx::Error> {
    let children = db::list_children(pool, monitor.id).await?;
    let active: Vec<Monitor> = children.into_iter().filter(|child| child.active).collect();

    if active.is_empty() {
        return Ok((Status::Pending, MSG_GROUP_EMPTY.to_string()));
    }

    let mut aggregate = Status::Up;
    for child in &active {
        let last_beat = db::find_latest(pool, child.id).await?;
        aggregate = degrade(aggregate, child_status(last_beat.as_ref()));
    }

    let msg = if aggregate == Status::Up {
        MSG_ALL_UP
    } else {
        MSG_CHILD_INACCESSIBLE
    };
    Ok((aggregate, msg.to_string()))
}

/// A child without any heartbeat yet counts as PENDING.
fn child_status(last_beat: Option<&Heartbeat>) -> Status {
    last_beat.map(|beat| beat.status).unwrap_or(Status::Pending)
}

/// Worst-child ranking: any DOWN child makes the group DOWN, a PENDING
/// child degrades UP to PENDING. Maintenance children count as available.
fn degrade(current: Status, child: Status) -> Status {
    match child {
        Status::Down => Status::Down,
        Status::Pending => {
            if current == Status::Up {
                Status::Pending
            } else {
                current
            }
        }
        Status::Up | Status::Maintenance => current,
    }
}

pub struct GroupDriver;

#[async_trait]
impl ProbeDriver for GroupDriver {
    async fn check(
        &self,
        monitor: &Monitor,
        beat: &mut Heartbeat,
        ctx: &ProbeContext<'_>,
    ) -> Result<ProbeOutcome, ProbeError> {
        let (status, msg) = resolve_group(ctx.pool, monitor).await?;
        // The aggregate is authoritative, DOWN included: a failing child
        // already went through its own retry accounting, so the group must
        // not be smoothed into PENDING a second time.
        beat.status = status;
        beat.msg = msg;
        Ok(ProbeOutcome::Beat)
    }
}
