//! TLS certificate info storage and cert-expiry notification bookkeeping.
//!
//! The send-history table is what makes expiry notifications fire at most
//! once per threshold between certificate rotations: a row `(type,
//! monitor_id, days)` records that a notification for `days` remaining was
//! already sent, and rotating the leaf certificate wipes the rows.

use sqlx::SqlitePool;

pub const CERTIFICATE_HISTORY_TYPE: &str = "certificate";

pub async fn upsert_tls_info(
    pool: &SqlitePool,
    monitor_id: i64,
    info: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO monitor_tls_info (monitor_id, info_json) VALUES (?, ?)
        ON CONFLICT (monitor_id) DO UPDATE SET info_json = excluded.info_json
        "#,
    )
    .bind(monitor_id)
    .bind(info.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_tls_info(
    pool: &SqlitePool,
    monitor_id: i64,
) -> Result<Option<serde_json::Value>, sqlx::Error> {
    let raw: Option<String> =
        sqlx::query_scalar("SELECT info_json FROM monitor_tls_info WHERE monitor_id = ?")
            .bind(monitor_id)
            .fetch_optional(pool)
            .await?;
    Ok(raw.and_then(|json| serde_json::from_str(&json).ok()))
}

/// True when a notification was already recorded for this monitor at a
/// threshold of `days_le` days or tighter.
pub async fn has_notification_sent(
    pool: &SqlitePool,
    history_type: &str,
    monitor_id: i64,
    days_le: i64,
) -> Result<bool, sqlx::Error> {
    let rows: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notification_sent_history WHERE type = ? AND monitor_id = ? AND days <= ?",
    )
    .bind(history_type)
    .bind(monitor_id)
    .bind(days_le)
    .fetch_one(pool)
    .await?;
    Ok(rows > 0)
}

pub async fn record_notification_sent(
    pool: &SqlitePool,
    history_type: &str,
    monitor_id: i64,
    days: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO notification_sent_history (type, monitor_id, days) VALUES (?, ?, ?)
        ON CONFLICT (type, monitor_id, days) DO NOTHING
        "#,
    )
    .bind(history_type)
    .bind(monitor_id)
    .bind(days)
    .execute(pool)
    .await?;
    Ok(())
}

/// Dedup state is scoped to one certificate; a fingerprint change calls
/// this so the fresh certificate notifies again.
pub async fn clear_certificate_history(
    pool: &SqlitePool,
    monitor_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM notification_sent_history WHERE type = ? AND monitor_id = ?")
        .bind(CERTIFICATE_HISTORY_TYPE)
        .bind(monitor_id)
        .execute(pool)
        .await?;
    Ok(())
}
