//! Monitor rows, the parent/child hierarchy and maintenance membership.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::{Maintenance, Monitor};

pub async fn find_monitor(pool: &SqlitePool, id: i64) -> Result<Option<Monitor>, sqlx::Error> {
    sqlx::query_as::<_, Monitor>("SELECT * FROM monitor WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_active(pool: &SqlitePool) -> Result<Vec<Monitor>, sqlx::Error> {
    sqlx::query_as::<_, Monitor>("SELECT * FROM monitor WHERE active = 1 ORDER BY id")
        .fetch_all(pool)
        .await
}

/// Direct children only; group recursion happens through children that are
/// groups themselves and run their own beat loops.
pub async fn list_children(pool: &SqlitePool, parent_id: i64) -> Result<Vec<Monitor>, sqlx::Error> {
    sqlx::query_as::<_, Monitor>("SELECT * FROM monitor WHERE parent_id = ? ORDER BY id")
        .bind(parent_id)
        .fetch_all(pool)
        .await
}

pub async fn find_parent(pool: &SqlitePool, id: i64) -> Result<Option<Monitor>, sqlx::Error> {
    sqlx::query_as::<_, Monitor>(
        "SELECT p.* FROM monitor p JOIN monitor c ON c.parent_id = p.id WHERE c.id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Every descendant id of `id`, any depth.
pub async fn all_children_ids(pool: &SqlitePool, id: i64) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        WITH RECURSIVE children (id) AS (
            SELECT id FROM monitor WHERE parent_id = ?
            UNION ALL
            SELECT m.id FROM monitor m JOIN children c ON m.parent_id = c.id
        )
        SELECT id FROM children
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await
}

/// Maintenance windows covering this monitor right now (directly linked
/// windows only; ancestor inheritance is handled by [`under_maintenance`]).
pub async fn list_active_maintenances(
    pool: &SqlitePool,
    monitor_id: i64,
) -> Result<Vec<Maintenance>, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as::<_, Maintenance>(
        r#"
        SELECT m.* FROM maintenance m
        JOIN monitor_maintenance mm ON mm.maintenance_id = m.id
        WHERE mm.monitor_id = ?
          AND m.active = 1
          AND (m.start_time IS NULL OR m.start_time <= ?)
          AND (m.end_time IS NULL OR m.end_time >= ?)
        "#,
    )
    .bind(monitor_id)
    .bind(now)
    .bind(now)
    .fetch_all(pool)
    .await
}

/// True when the monitor itself or any ancestor is linked to a currently
/// active maintenance window.
pub async fn under_maintenance(pool: &SqlitePool, monitor_id: i64) -> Result<bool, sqlx::Error> {
    let mut current = Some(monitor_id);
    // Parent chains are shallow; the cap only guards against a cyclic
    // parent_id written by hand.
    let mut hops = 0;
    while let Some(id) = current {
        if hops > 64 {
            break;
        }
        hops += 1;

        if !list_active_maintenances(pool, id).await?.is_empty() {
            return Ok(true);
        }

        current = sqlx::query_scalar::<_, Option<i64>>("SELECT parent_id FROM monitor WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .flatten();
    }
    Ok(false)
}

/// DNS probes remember their last formatted answer so changes can be
/// reported exactly once.
pub async fn update_dns_last_result(
    pool: &SqlitePool,
    monitor_id: i64,
    result: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE monitor SET dns_last_result = ? WHERE id = ?")
        .bind(result)
        .bind(monitor_id)
        .execute(pool)
        .await?;
    Ok(())
}
