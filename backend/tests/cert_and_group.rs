//! Certificate-expiry dedup and group aggregation against the store.

mod common;

use backend::db::models::Heartbeat;
use backend::db::services as db;
use backend::monitor::group::{resolve_group, MSG_ALL_UP, MSG_CHILD_INACCESSIBLE, MSG_GROUP_EMPTY};
use backend::monitor::status::Status;
use backend::monitor::tls::{handle_tls_info, CertInfo, TlsInfo};
use backend::notifications::service::NotificationService;
use backend::server::env::Env;
use backend::monitor::runtime::{MonitorRuntime, RuntimeDeps};
use backend::server::config::ServerConfig;
use chrono::{Duration, Utc};
use common::{insert_monitor, list_beats, test_pool, MonitorSpec};
use sqlx::SqlitePool;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn leaf_chain(days_remaining: i64, fingerprint: &str) -> TlsInfo {
    let now = Utc::now();
    TlsInfo {
        valid: true,
        cert_info: Some(CertInfo {
            subject_cn: "example.com".to_string(),
            issuer_cn: "Example CA".to_string(),
            cert_type: "server".to_string(),
            fingerprint256: fingerprint.to_string(),
            valid_from: now - Duration::days(80),
            valid_to: now + Duration::days(days_remaining),
            days_remaining,
            valid: true,
            issuer_certificate: None,
        }),
    }
}

async fn sent_days(pool: &SqlitePool, monitor_id: i64) -> Vec<i64> {
    sqlx::query_scalar(
        "SELECT days FROM notification_sent_history WHERE monitor_id = ? ORDER BY days ASC",
    )
    .bind(monitor_id)
    .fetch_all(pool)
    .await
    .unwrap()
}

#[tokio::test]
async fn cert_expiry_records_one_row_per_crossed_threshold() {
    let pool = test_pool().await;
    let monitor = insert_monitor(
        &pool,
        MonitorSpec {
            monitor_type: "http",
            expiry_notification: true,
            url: Some("https://example.com"),
            ..MonitorSpec::default()
        },
    )
    .await;
    let notifications = NotificationService::new(pool.clone());
    let env = Env::default();

    // 10 days remaining crosses the 14 and 21 day thresholds, not 7.
    handle_tls_info(&pool, &notifications, &monitor, &leaf_chain(10, "AA:BB"), &env)
        .await
        .unwrap();
    assert_eq!(sent_days(&pool, monitor.id).await, vec![14, 21]);

    // Same certificate on the next probe: nothing new.
    handle_tls_info(&pool, &notifications, &monitor, &leaf_chain(10, "AA:BB"), &env)
        .await
        .unwrap();
    assert_eq!(sent_days(&pool, monitor.id).await, vec![14, 21]);

    let stored = db::find_tls_info(&pool, monitor.id).await.unwrap().unwrap();
    assert_eq!(stored["certInfo"]["fingerprint256"], "AA:BB");
}

#[tokio::test]
async fn cert_rotation_erases_dedup_state_and_notifies_again() {
    let pool = test_pool().await;
    let monitor = insert_monitor(
        &pool,
        MonitorSpec {
            monitor_type: "http",
            expiry_notification: true,
            url: Some("https://example.com"),
            ..MonitorSpec::default()
        },
    )
    .await;
    let notifications = NotificationService::new(pool.clone());
    let env = Env::default();

    handle_tls_info(&pool, &notifications, &monitor, &leaf_chain(10, "AA:BB"), &env)
        .await
        .unwrap();
    // Sentinel row that only a real wipe removes.
    db::record_notification_sent(&pool, "certificate", monitor.id, 7)
        .await
        .unwrap();
    assert_eq!(sent_days(&pool, monitor.id).await, vec![7, 14, 21]);

    // Rotated certificate: history is wiped, then the crossed thresholds
    // are recorded fresh.
    handle_tls_info(&pool, &notifications, &monitor, &leaf_chain(10, "CC:DD"), &env)
        .await
        .unwrap();
    assert_eq!(sent_days(&pool, monitor.id).await, vec![14, 21]);
}

#[tokio::test]
async fn ignore_tls_suppresses_expiry_notifications() {
    let pool = test_pool().await;
    let monitor = insert_monitor(
        &pool,
        MonitorSpec {
            monitor_type: "http",
            expiry_notification: true,
            url: Some("https://example.com"),
            ..MonitorSpec::default()
        },
    )
    .await;
    sqlx::query("UPDATE monitor SET ignore_tls = 1 WHERE id = ?")
        .bind(monitor.id)
        .execute(&pool)
        .await
        .unwrap();
    let monitor = db::find_monitor(&pool, monitor.id).await.unwrap().unwrap();

    let notifications = NotificationService::new(pool.clone());
    handle_tls_info(
        &pool,
        &notifications,
        &monitor,
        &leaf_chain(3, "AA:BB"),
        &Env::default(),
    )
    .await
    .unwrap();

    assert!(sent_days(&pool, monitor.id).await.is_empty());
    // The chain itself is still stored.
    assert!(db::find_tls_info(&pool, monitor.id).await.unwrap().is_some());
}

async fn append_beat(pool: &SqlitePool, monitor_id: i64, status: Status) {
    let mut beat = Heartbeat::new(monitor_id, Utc::now());
    beat.status = status;
    db::append(pool, &beat).await.unwrap();
}

#[tokio::test]
async fn group_degrades_to_the_worst_child() {
    let pool = test_pool().await;
    let group = insert_monitor(
        &pool,
        MonitorSpec {
            name: "group",
            monitor_type: "group",
            ..MonitorSpec::default()
        },
    )
    .await;
    let child_a = insert_monitor(
        &pool,
        MonitorSpec {
            name: "a",
            parent_id: Some(group.id),
            ..MonitorSpec::default()
        },
    )
    .await;
    let child_b = insert_monitor(
        &pool,
        MonitorSpec {
            name: "b",
            parent_id: Some(group.id),
            ..MonitorSpec::default()
        },
    )
    .await;
    let child_c = insert_monitor(
        &pool,
        MonitorSpec {
            name: "c",
            parent_id: Some(group.id),
            ..MonitorSpec::default()
        },
    )
    .await;

    append_beat(&pool, child_a.id, Status::Up).await;
    append_beat(&pool, child_b.id, Status::Pending).await;
    append_beat(&pool, child_c.id, Status::Up).await;

    let (status, msg) = resolve_group(&pool, &group).await.unwrap();
    assert_eq!(status, Status::Pending);
    assert_eq!(msg, MSG_CHILD_INACCESSIBLE);

    append_beat(&pool, child_b.id, Status::Down).await;
    let (status, _) = resolve_group(&pool, &group).await.unwrap();
    assert_eq!(status, Status::Down);

    append_beat(&pool, child_b.id, Status::Up).await;
    let (status, msg) = resolve_group(&pool, &group).await.unwrap();
    assert_eq!(status, Status::Up);
    assert_eq!(msg, MSG_ALL_UP);
}

#[tokio::test]
async fn group_down_verdict_skips_retry_smoothing_in_the_beat_loop() {
    let pool = test_pool().await;
    // A retry budget that would smooth an ordinary probe failure into
    // PENDING for three beats.
    let group = insert_monitor(
        &pool,
        MonitorSpec {
            name: "group",
            monitor_type: "group",
            max_retries: 3,
            retry_interval: 30,
            ..MonitorSpec::default()
        },
    )
    .await;
    let child_up = insert_monitor(
        &pool,
        MonitorSpec {
            name: "up",
            parent_id: Some(group.id),
            ..MonitorSpec::default()
        },
    )
    .await;
    let child_down = insert_monitor(
        &pool,
        MonitorSpec {
            name: "down",
            parent_id: Some(group.id),
            ..MonitorSpec::default()
        },
    )
    .await;
    append_beat(&pool, child_up.id, Status::Up).await;
    append_beat(&pool, child_down.id, Status::Down).await;

    let config = ServerConfig {
        database_url: String::new(),
        demo_mode: false,
        steam_api_key: None,
    };
    let deps = Arc::new(RuntimeDeps::new(pool.clone(), &config));
    let mut runtime = MonitorRuntime::new(group.clone(), deps, Arc::new(AtomicBool::new(false)));

    // First beat: straight to DOWN, no PENDING beats in between.
    runtime.tick().await.expect("tick");
    let beats = list_beats(&pool, group.id).await;
    assert_eq!(beats.len(), 1);
    assert_eq!(beats[0].status, Status::Down);
    assert_eq!(beats[0].msg, MSG_CHILD_INACCESSIBLE);

    // Recovery is just as immediate once the child comes back.
    append_beat(&pool, child_down.id, Status::Up).await;
    runtime.tick().await.expect("tick");
    let beats = list_beats(&pool, group.id).await;
    assert_eq!(beats[1].status, Status::Up);
    assert_eq!(beats[1].msg, MSG_ALL_UP);
    assert!(beats[1].important, "down-to-up is an important transition");
}

#[tokio::test]
async fn group_handles_empty_missing_and_inactive_children() {
    let pool = test_pool().await;
    let group = insert_monitor(
        &pool,
        MonitorSpec {
            name: "group",
            monitor_type: "group",
            ..MonitorSpec::default()
        },
    )
    .await;

    let (status, msg) = resolve_group(&pool, &group).await.unwrap();
    assert_eq!(status, Status::Pending);
    assert_eq!(msg, MSG_GROUP_EMPTY);

    // An active child without any heartbeat keeps the group PENDING.
    let silent = insert_monitor(
        &pool,
        MonitorSpec {
            name: "silent",
            parent_id: Some(group.id),
            ..MonitorSpec::default()
        },
    )
    .await;
    let (status, _) = resolve_group(&pool, &group).await.unwrap();
    assert_eq!(status, Status::Pending);

    // Once it reports UP the group recovers; an inactive DOWN sibling is
    // ignored entirely.
    append_beat(&pool, silent.id, Status::Up).await;
    let inactive = insert_monitor(
        &pool,
        MonitorSpec {
            name: "inactive",
            parent_id: Some(group.id),
            active: false,
            ..MonitorSpec::default()
        },
    )
    .await;
    append_beat(&pool, inactive.id, Status::Down).await;

    let (status, msg) = resolve_group(&pool, &group).await.unwrap();
    assert_eq!(status, Status::Up);
    assert_eq!(msg, MSG_ALL_UP);
}
