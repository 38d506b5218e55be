//! End-to-end beat-loop scenarios over an in-memory store, with a probe
//! driver scripted per tick.

mod common;

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use backend::db::models::{Heartbeat, Monitor};
use backend::monitor::runtime::{MonitorRuntime, RuntimeDeps};
use backend::monitor::status::Status;
use backend::probes::{ProbeContext, ProbeDriver, ProbeError, ProbeOutcome, ProbeRegistry};
use backend::server::config::ServerConfig;
use backend::server::supervisor::Supervisor;
use common::{insert_monitor, list_beats, test_pool, MonitorSpec};
use sqlx::SqlitePool;

type ScriptStep = Result<(Status, &'static str), &'static str>;

struct ScriptedProbe {
    steps: Mutex<VecDeque<ScriptStep>>,
}

impl ScriptedProbe {
    fn new(steps: Vec<ScriptStep>) -> Self {
        ScriptedProbe {
            steps: Mutex::new(steps.into()),
        }
    }
}

#[async_trait]
impl ProbeDriver for ScriptedProbe {
    async fn check(
        &self,
        _monitor: &Monitor,
        beat: &mut Heartbeat,
        _ctx: &ProbeContext<'_>,
    ) -> Result<ProbeOutcome, ProbeError> {
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .expect("probe script exhausted");
        match step {
            Ok((status, msg)) => {
                beat.status = status;
                beat.msg = msg.to_string();
                beat.ping = Some(5.0);
                Ok(ProbeOutcome::Beat)
            }
            Err(msg) => Err(ProbeError::Network(msg.to_string())),
        }
    }
}

fn test_config() -> ServerConfig {
    ServerConfig {
        database_url: String::new(),
        demo_mode: false,
        steam_api_key: None,
    }
}

fn deps_with_script(pool: &SqlitePool, steps: Vec<ScriptStep>) -> Arc<RuntimeDeps> {
    let mut registry = ProbeRegistry::empty();
    registry.register("scripted", Box::new(ScriptedProbe::new(steps)));
    let mut deps = RuntimeDeps::new(pool.clone(), &test_config());
    deps.registry = registry;
    Arc::new(deps)
}

fn runtime(monitor: Monitor, deps: Arc<RuntimeDeps>) -> MonitorRuntime {
    MonitorRuntime::new(monitor, deps, Arc::new(AtomicBool::new(false)))
}

#[tokio::test]
async fn flap_with_retries_walks_pending_into_down_and_back_up() {
    let pool = test_pool().await;
    let monitor = insert_monitor(
        &pool,
        MonitorSpec {
            interval: 60,
            max_retries: 2,
            retry_interval: 30,
            ..MonitorSpec::default()
        },
    )
    .await;
    let deps = deps_with_script(
        &pool,
        vec![
            Err("connect refused"),
            Err("connect refused"),
            Err("connect refused"),
            Ok((Status::Up, "200 OK")),
            Err("connect refused"),
        ],
    );

    let mut runtime = runtime(monitor.clone(), deps);
    let mut delays = Vec::new();
    for _ in 0..5 {
        delays.push(runtime.tick().await.expect("tick"));
    }

    let beats = list_beats(&pool, monitor.id).await;
    let statuses: Vec<Status> = beats.iter().map(|beat| beat.status).collect();
    assert_eq!(
        statuses,
        vec![
            Status::Pending,
            Status::Pending,
            Status::Down,
            Status::Up,
            // The successful beat reset the retry budget.
            Status::Pending,
        ]
    );

    let important: Vec<bool> = beats.iter().map(|beat| beat.important).collect();
    assert_eq!(important, vec![true, false, true, true, false]);

    // PENDING beats reschedule on the retry interval, others on the beat
    // interval.
    assert_eq!(delays[0], Duration::from_secs(30));
    assert_eq!(delays[1], Duration::from_secs(30));
    assert_eq!(delays[2], Duration::from_secs(60));
    assert_eq!(delays[3], Duration::from_secs(60));
    assert_eq!(delays[4], Duration::from_secs(30));

    // Durations are the whole-second gap to the predecessor; ticking
    // back-to-back keeps them at zero, with the first beat pinned to zero
    // by definition.
    assert!(beats.iter().all(|beat| beat.duration <= 1));
}

#[tokio::test]
async fn resend_interval_counts_down_beats_and_resets() {
    let pool = test_pool().await;
    let monitor = insert_monitor(
        &pool,
        MonitorSpec {
            resend_interval: 3,
            ..MonitorSpec::default()
        },
    )
    .await;
    let deps = deps_with_script(&pool, vec![Err("down"); 5]);

    let mut runtime = runtime(monitor.clone(), deps);
    for _ in 0..5 {
        runtime.tick().await.expect("tick");
    }

    let beats = list_beats(&pool, monitor.id).await;
    assert!(beats.iter().all(|beat| beat.status == Status::Down));
    assert_eq!(
        beats.iter().map(|beat| beat.important).collect::<Vec<_>>(),
        vec![true, false, false, false, false]
    );
    // down_count climbs between notifications and resets when the resend
    // fires on beat 4 (and on the important beat 1).
    assert_eq!(
        beats.iter().map(|beat| beat.down_count).collect::<Vec<_>>(),
        vec![0, 1, 2, 0, 1]
    );
}

#[tokio::test]
async fn upside_down_flips_a_successful_probe_into_down() {
    let pool = test_pool().await;
    let monitor = insert_monitor(
        &pool,
        MonitorSpec {
            upside_down: true,
            ..MonitorSpec::default()
        },
    )
    .await;
    let deps = deps_with_script(&pool, vec![Ok((Status::Up, "200 OK"))]);

    let mut runtime = runtime(monitor.clone(), deps);
    runtime.tick().await.expect("tick");

    let beats = list_beats(&pool, monitor.id).await;
    assert_eq!(beats.len(), 1);
    assert_eq!(beats[0].status, Status::Down);
    assert!(beats[0].important);
    // The probe's own message survives with the inversion marker.
    assert!(beats[0].msg.contains("200 OK"));
    assert!(beats[0].msg.contains("flipped"));
}

#[tokio::test]
async fn upside_down_probe_error_reads_as_up() {
    let pool = test_pool().await;
    let monitor = insert_monitor(
        &pool,
        MonitorSpec {
            upside_down: true,
            max_retries: 2,
            ..MonitorSpec::default()
        },
    )
    .await;
    let deps = deps_with_script(&pool, vec![Err("connect refused")]);

    let mut runtime = runtime(monitor.clone(), deps);
    runtime.tick().await.expect("tick");

    let beats = list_beats(&pool, monitor.id).await;
    assert_eq!(beats[0].status, Status::Up);
    assert!(beats[0].important, "first beat is always important");
}

#[tokio::test]
async fn unknown_monitor_type_surfaces_canonical_message() {
    let pool = test_pool().await;
    let monitor = insert_monitor(
        &pool,
        MonitorSpec {
            monitor_type: "carrier-pigeon",
            ..MonitorSpec::default()
        },
    )
    .await;
    let deps = deps_with_script(&pool, Vec::new());

    let mut runtime = runtime(monitor.clone(), deps);
    runtime.tick().await.expect("tick");

    let beats = list_beats(&pool, monitor.id).await;
    assert_eq!(beats[0].status, Status::Down);
    assert_eq!(beats[0].msg, "Unknown Monitor Type");
}

#[tokio::test]
async fn maintenance_window_short_circuits_probing() {
    let pool = test_pool().await;
    let monitor = insert_monitor(&pool, MonitorSpec::default()).await;

    sqlx::query(
        "INSERT INTO maintenance (title, active, start_time, end_time) VALUES ('window', 1, ?, ?)",
    )
    .bind(chrono::Utc::now() - chrono::Duration::hours(1))
    .bind(chrono::Utc::now() + chrono::Duration::hours(1))
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO monitor_maintenance (monitor_id, maintenance_id) VALUES (?, 1)")
        .bind(monitor.id)
        .execute(&pool)
        .await
        .unwrap();

    // The scripted step must stay untouched: probing is skipped entirely.
    let deps = deps_with_script(&pool, vec![Err("must not run")]);
    let mut runtime = runtime(monitor.clone(), deps);
    runtime.tick().await.expect("tick");

    let beats = list_beats(&pool, monitor.id).await;
    assert_eq!(beats[0].status, Status::Maintenance);
    assert_eq!(beats[0].msg, "Monitor under maintenance");
}

#[tokio::test]
async fn supervisor_start_stop_cycle_is_side_effect_free() {
    let pool = test_pool().await;
    // A push monitor defers its first tick by one interval, so no beat can
    // land during this test.
    let monitor = insert_monitor(
        &pool,
        MonitorSpec {
            monitor_type: "push",
            interval: 3600,
            ..MonitorSpec::default()
        },
    )
    .await;

    let supervisor = Supervisor::new(RuntimeDeps::new(pool.clone(), &test_config()));
    supervisor.start(monitor.clone());
    supervisor.start(monitor.clone());
    assert!(supervisor.is_running(monitor.id));

    supervisor.stop(monitor.id);
    assert!(!supervisor.is_running(monitor.id));

    supervisor.start(monitor.clone());
    supervisor.stop(monitor.id);

    assert!(list_beats(&pool, monitor.id).await.is_empty());
}

#[tokio::test]
async fn push_driver_defers_on_fresh_up_and_fails_otherwise() {
    use backend::probes::push::PushDriver;
    use chrono::Utc;

    let pool = test_pool().await;
    let monitor = insert_monitor(
        &pool,
        MonitorSpec {
            monitor_type: "push",
            interval: 60,
            ..MonitorSpec::default()
        },
    )
    .await;

    let env = backend::server::env::Env::default();
    let oauth = tokio::sync::Mutex::new(None);
    let ctx = ProbeContext {
        pool: &pool,
        env: &env,
        beat_interval: 60,
        timeout: 48.0,
        oauth_token: &oauth,
        tls_info: Mutex::new(None),
    };
    let driver = PushDriver;
    let mut beat = Heartbeat::new(monitor.id, Utc::now());

    // No external heartbeat at all.
    let err = driver.check(&monitor, &mut beat, &ctx).await.unwrap_err();
    assert_eq!(err.to_string(), "No heartbeat in the time window");

    // Fresh UP heartbeat from the agent: defer for the rest of the window.
    let mut external = Heartbeat::new(monitor.id, Utc::now() - chrono::Duration::seconds(10));
    external.status = Status::Up;
    backend::db::services::append(&pool, &external).await.unwrap();
    match driver.check(&monitor, &mut beat, &ctx).await.unwrap() {
        ProbeOutcome::Defer(delay) => {
            assert!(delay <= Duration::from_millis(61_000));
            assert!(delay >= Duration::from_millis(45_000));
        }
        ProbeOutcome::Beat => panic!("expected a deferred beat"),
    }

    // A DOWN row inside the window is not a live signal.
    let mut down = Heartbeat::new(monitor.id, Utc::now());
    down.status = Status::Down;
    backend::db::services::append(&pool, &down).await.unwrap();
    let err = driver.check(&monitor, &mut beat, &ctx).await.unwrap_err();
    assert_eq!(err.to_string(), "No heartbeat in the time window");
}
