//! The per-monitor beat loop.
//!
//! One runtime owns one monitor: its timer, its `previous_beat`, its retry
//! counter and its stop flag. Ticks are strictly serialized; different
//! monitors only ever share the pool, the uptime cache and the live bus.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::db::models::{Heartbeat, Monitor};
use crate::db::services as db;
use crate::metrics::MetricsSink;
use crate::monitor::status::Status;
use crate::monitor::uptime::UptimeService;
use crate::monitor::{pre_command, tls, transition};
use crate::notifications::service::NotificationService;
use crate::probes::{OauthToken, ProbeContext, ProbeError, ProbeOutcome, ProbeRegistry};
use crate::server::config::ServerConfig;
use crate::server::env::EnvHandle;
use crate::server::live_bus::{LiveBus, LiveEvent};

/// Collaborators shared by every monitor runtime of one process.
pub struct RuntimeDeps {
    pub pool: SqlitePool,
    pub registry: ProbeRegistry,
    pub live_bus: LiveBus,
    pub uptime: UptimeService,
    pub notifications: NotificationService,
    pub metrics: MetricsSink,
    pub env: EnvHandle,
}

impl RuntimeDeps {
    pub fn new(pool: SqlitePool, config: &ServerConfig) -> Self {
        RuntimeDeps {
            registry: ProbeRegistry::with_builtin_drivers(),
            live_bus: LiveBus::new(),
            uptime: UptimeService::new(),
            notifications: NotificationService::new(pool.clone()),
            metrics: MetricsSink::new(),
            env: EnvHandle::new(config),
            pool,
        }
    }
}

#[derive(Debug, Error)]
pub enum TickError {
    #[error("storage error: {0}")]
    Db(#[from] sqlx::Error),
}

pub struct MonitorRuntime {
    monitor: Monitor,
    deps: Arc<RuntimeDeps>,
    previous_beat: Option<Heartbeat>,
    retries: i64,
    oauth_token: Mutex<Option<OauthToken>>,
    stop: Arc<AtomicBool>,
}

impl MonitorRuntime {
    pub fn new(monitor: Monitor, deps: Arc<RuntimeDeps>, stop: Arc<AtomicBool>) -> Self {
        MonitorRuntime {
            monitor,
            deps,
            previous_beat: None,
            retries: 0,
            oauth_token: Mutex::new(None),
            stop,
        }
    }

    /// Drives the beat loop until stopped. Push monitors defer the first
    /// tick by one interval so the external agent has a window to report
    /// in; everything else ticks immediately.
    pub async fn run(mut self) {
        if self.monitor.monitor_type == "push" {
            tokio::time::sleep(Duration::from_secs(self.monitor.interval.max(1) as u64)).await;
        }
        loop {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            let delay = match self.tick().await {
                Ok(delay) => delay,
                Err(e) => {
                    // Outermost tick boundary: nothing escapes the loop,
                    // the runtime just tries again after one interval.
                    error!(
                        monitor_id = self.monitor.id,
                        error = %e,
                        "Beat failed; rescheduling."
                    );
                    Duration::from_secs(self.monitor.interval.max(1) as u64)
                }
            };
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(delay).await;
        }
        debug!(monitor_id = self.monitor.id, "Beat loop stopped.");
    }

    /// Runs one beat and returns the delay until the next one.
    pub async fn tick(&mut self) -> Result<Duration, TickError> {
        let deps = self.deps.clone();
        let pool = &deps.pool;
        let env = deps.env.snapshot();
        let monitor = self.monitor.clone();

        // Normalize schedule knobs.
        let mut beat_interval = monitor.interval.max(1) as u64;
        if env.demo_mode {
            beat_interval = beat_interval.max(20);
        }
        let timeout = if monitor.timeout > 0.0 {
            monitor.timeout
        } else {
            monitor.interval as f64 * 0.8
        };

        // Load the previous beat. Push monitors re-read every tick because
        // the push endpoint appends rows behind our back.
        if self.previous_beat.is_none() || monitor.monitor_type == "push" {
            self.previous_beat = db::find_latest(pool, monitor.id).await?;
        }
        let first_beat = self.previous_beat.is_none();

        // Compose the beat skeleton.
        let now = Utc::now();
        let mut beat = Heartbeat::new(monitor.id, now);
        if let Some(previous) = &self.previous_beat {
            beat.down_count = previous.down_count;
            beat.duration = (now - previous.time).num_seconds();
        }
        if monitor.upside_down {
            beat.status = Status::Up;
        }

        let mut probe_failed = false;
        let mut tls_info: Option<tls::TlsInfo> = None;

        if db::under_maintenance(pool, monitor.id).await? {
            beat.status = Status::Maintenance;
            beat.msg = "Monitor under maintenance".to_string();
        } else {
            let ctx = ProbeContext {
                pool,
                env: &env,
                beat_interval,
                timeout,
                oauth_token: &self.oauth_token,
                tls_info: std::sync::Mutex::new(None),
            };
            let result = match deps.registry.driver_for(&monitor.monitor_type) {
                None => Err(ProbeError::UnknownType),
                Some(driver) => {
                    // Hard cancellation bound over whatever the driver does
                    // with its own internal timeout.
                    let hard_bound = Duration::from_secs_f64(timeout + 10.0);
                    match tokio::time::timeout(hard_bound, driver.check(&monitor, &mut beat, &ctx))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(ProbeError::Timeout(timeout)),
                    }
                }
            };
            tls_info = ctx.tls_info.into_inner().unwrap_or(None);

            match result {
                Ok(ProbeOutcome::Beat) => {
                    if monitor.upside_down {
                        beat.status = beat.status.flipped();
                        if beat.status == Status::Down {
                            // A flipped DOWN runs through the same retry
                            // accounting as a probe error.
                            probe_failed = true;
                            beat.msg = format!("{} (flipped by upside-down mode)", beat.msg);
                        }
                    }
                }
                Ok(ProbeOutcome::Defer(delay)) => {
                    // Push monitor saw a fresh external heartbeat: no row
                    // this tick, just wait out the rest of the window.
                    self.retries = 0;
                    debug!(
                        monitor_id = monitor.id,
                        next_in_ms = delay.as_millis() as u64,
                        "External heartbeat in window; deferring."
                    );
                    return Ok(delay);
                }
                Err(e) => {
                    probe_failed = true;
                    beat.msg = e.to_string();
                }
            }
        }

        // The TLS tracker stores the chain and runs its own expiry
        // notifications regardless of how this beat classifies.
        if let Some(captured) = &tls_info {
            if let Err(e) =
                tls::handle_tls_info(pool, &deps.notifications, &monitor, captured, &env).await
            {
                warn!(monitor_id = monitor.id, error = %e, "TLS tracking failed.");
            }
        }

        // Retry accounting. Maintenance suppresses it entirely.
        if beat.status == Status::Maintenance {
            // keep retries untouched
        } else if probe_failed {
            if monitor.upside_down && beat.status == Status::Up {
                // Probe error while upside-down reads as service up.
                self.retries = 0;
            } else if self.retries < monitor.max_retries {
                self.retries += 1;
                beat.status = Status::Pending;
            } else {
                beat.status = Status::Down;
            }
        } else {
            self.retries = 0;
        }

        // Importance classification drives logging, notifications and the
        // resend counter.
        let prev_status = self.previous_beat.as_ref().map(|previous| previous.status);
        if transition::is_important(first_beat, prev_status, beat.status) {
            beat.important = true;
            if transition::is_important_for_notify(first_beat, prev_status, beat.status) {
                info!(
                    monitor_id = monitor.id,
                    from = ?prev_status,
                    to = %beat.status,
                    "Status changed; dispatching notifications."
                );
                pre_command::run_transition_command(&monitor, beat.status).await;
                deps.notifications
                    .notify_important_beat(&monitor, &beat, &env)
                    .await;
            }
            beat.down_count = 0;
        } else if beat.status == Status::Down && monitor.resend_interval > 0 {
            beat.down_count += 1;
            if beat.down_count >= monitor.resend_interval {
                info!(
                    monitor_id = monitor.id,
                    down_beats = beat.down_count,
                    "Still down; resending notifications."
                );
                deps.notifications
                    .notify_important_beat(&monitor, &beat, &env)
                    .await;
                beat.down_count = 0;
            }
        }

        // Publish before persisting so dashboards see the beat in the same
        // order it will land in storage for this monitor.
        deps.uptime.invalidate(monitor.id);
        deps.live_bus.emit(
            monitor.owner_id,
            LiveEvent::Heartbeat(serde_json::to_value(&beat).unwrap_or_default()),
        );
        if deps.live_bus.has_subscribers(monitor.owner_id) {
            self.emit_stats(&deps).await;
        }

        db::append(pool, &beat).await?;
        deps.metrics.update(&monitor, &beat, tls_info.as_ref());

        debug!(
            monitor_id = monitor.id,
            status = %beat.status,
            msg = %beat.msg,
            ping = ?beat.ping,
            "Beat recorded."
        );

        let status = beat.status;
        self.previous_beat = Some(beat);

        let delay_secs = if status == Status::Pending && monitor.retry_interval > 0 {
            monitor.retry_interval as u64
        } else {
            beat_interval
        };
        Ok(Duration::from_secs(delay_secs))
    }

    /// Aggregated stats are only computed while someone is watching.
    async fn emit_stats(&self, deps: &RuntimeDeps) {
        let pool = &deps.pool;
        let monitor_id = self.monitor.id;
        let owner_id = self.monitor.owner_id;

        match deps.uptime.avg_ping(pool, monitor_id, 24).await {
            Ok(avg_ping) => deps.live_bus.emit(
                owner_id,
                LiveEvent::AvgPing {
                    monitor_id,
                    avg_ping,
                },
            ),
            Err(e) => warn!(monitor_id, error = %e, "avg ping query failed."),
        }

        for period_hours in [24u32, 720u32] {
            match deps.uptime.uptime(pool, monitor_id, period_hours).await {
                Ok(ratio) => deps.live_bus.emit(
                    owner_id,
                    LiveEvent::Uptime {
                        monitor_id,
                        period_hours,
                        ratio,
                    },
                ),
                Err(e) => warn!(monitor_id, period_hours, error = %e, "uptime query failed."),
            }
        }

        match db::find_tls_info(pool, monitor_id).await {
            Ok(Some(info)) => deps
                .live_bus
                .emit(owner_id, LiveEvent::CertInfo { monitor_id, info }),
            Ok(None) => {}
            Err(e) => warn!(monitor_id, error = %e, "tls info query failed."),
        }
    }
}
