//! Heartbeat persistence and window queries.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::models::Heartbeat;

pub async fn find_latest(
    pool: &SqlitePool,
    monitor_id: i64,
) -> Result<Option<Heartbeat>, sqlx::Error> {
    sqlx::query_as::<_, Heartbeat>(
        "SELECT * FROM heartbeat WHERE monitor_id = ? ORDER BY time DESC, id DESC LIMIT 1",
    )
    .bind(monitor_id)
    .fetch_optional(pool)
    .await
}

pub async fn append(pool: &SqlitePool, beat: &Heartbeat) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO heartbeat (monitor_id, status, time, msg, ping, duration, important, down_count)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(beat.monitor_id)
    .bind(beat.status as i64)
    .bind(beat.time)
    .bind(&beat.msg)
    .bind(beat.ping)
    .bind(beat.duration)
    .bind(beat.important)
    .bind(beat.down_count)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Heartbeats strictly newer than `since`, oldest first. Feeds the
/// duration-trimmed availability arithmetic.
pub async fn list_since(
    pool: &SqlitePool,
    monitor_id: i64,
    since: DateTime<Utc>,
) -> Result<Vec<Heartbeat>, sqlx::Error> {
    sqlx::query_as::<_, Heartbeat>(
        "SELECT * FROM heartbeat WHERE monitor_id = ? AND time > ? ORDER BY time ASC, id ASC",
    )
    .bind(monitor_id)
    .bind(since)
    .fetch_all(pool)
    .await
}

/// Mean ping over the window, ignoring beats without a ping.
pub async fn avg_ping(
    pool: &SqlitePool,
    monitor_id: i64,
    since: DateTime<Utc>,
) -> Result<Option<f64>, sqlx::Error> {
    sqlx::query_scalar::<_, Option<f64>>(
        "SELECT AVG(ping) FROM heartbeat WHERE monitor_id = ? AND time > ? AND ping IS NOT NULL",
    )
    .bind(monitor_id)
    .bind(since)
    .fetch_one(pool)
    .await
}
