#![allow(dead_code)]

use backend::db::models::{Heartbeat, Monitor};
use backend::db::MIGRATOR;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// One persistent in-memory connection; more than one would each see their
/// own empty database.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    MIGRATOR.run(&pool).await.expect("migrations");
    pool
}

pub struct MonitorSpec {
    pub name: &'static str,
    pub monitor_type: &'static str,
    pub interval: i64,
    pub retry_interval: i64,
    pub resend_interval: i64,
    pub max_retries: i64,
    pub upside_down: bool,
    pub active: bool,
    pub parent_id: Option<i64>,
    pub expiry_notification: bool,
    pub url: Option<&'static str>,
}

impl Default for MonitorSpec {
    fn default() -> Self {
        MonitorSpec {
            name: "monitor",
            monitor_type: "scripted",
            interval: 60,
            retry_interval: 0,
            resend_interval: 0,
            max_retries: 0,
            upside_down: false,
            active: true,
            parent_id: None,
            expiry_notification: false,
            url: None,
        }
    }
}

pub async fn insert_monitor(pool: &SqlitePool, spec: MonitorSpec) -> Monitor {
    let result = sqlx::query(
        r#"
        INSERT INTO monitor (
            owner_id, name, monitor_type, active, parent_id,
            interval, retry_interval, resend_interval, max_retries,
            timeout, upside_down, expiry_notification, url
        ) VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, 10, ?, ?, ?)
        "#,
    )
    .bind(spec.name)
    .bind(spec.monitor_type)
    .bind(spec.active)
    .bind(spec.parent_id)
    .bind(spec.interval)
    .bind(spec.retry_interval)
    .bind(spec.resend_interval)
    .bind(spec.max_retries)
    .bind(spec.upside_down)
    .bind(spec.expiry_notification)
    .bind(spec.url)
    .execute(pool)
    .await
    .expect("insert monitor");

    backend::db::services::find_monitor(pool, result.last_insert_rowid())
        .await
        .expect("load monitor")
        .expect("monitor exists")
}

pub async fn list_beats(pool: &SqlitePool, monitor_id: i64) -> Vec<Heartbeat> {
    sqlx::query_as::<_, Heartbeat>("SELECT * FROM heartbeat WHERE monitor_id = ? ORDER BY id ASC")
        .bind(monitor_id)
        .fetch_all(pool)
        .await
        .expect("list beats")
}
