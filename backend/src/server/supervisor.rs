//! Lifecycle owner of every monitor runtime in the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::live_bus::LiveEvent;
use crate::db::models::Monitor;
use crate::db::services as db;
use crate::monitor::runtime::{MonitorRuntime, RuntimeDeps};

struct RunningMonitor {
    monitor: Monitor,
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

pub struct Supervisor {
    deps: Arc<RuntimeDeps>,
    running: DashMap<i64, RunningMonitor>,
}

impl Supervisor {
    pub fn new(deps: RuntimeDeps) -> Self {
        Supervisor {
            deps: Arc::new(deps),
            running: DashMap::new(),
        }
    }

    pub fn deps(&self) -> &Arc<RuntimeDeps> {
        &self.deps
    }

    /// Boots every active monitor. Returns how many runtimes are running.
    pub async fn start_all(&self) -> Result<usize, sqlx::Error> {
        self.deps.env.refresh(&self.deps.pool).await;
        let monitors = db::list_active(&self.deps.pool).await?;
        for monitor in monitors {
            self.start(monitor);
        }
        Ok(self.running.len())
    }

    /// Idempotent: starting an already-running monitor is a no-op.
    pub fn start(&self, monitor: Monitor) {
        if self.running.contains_key(&monitor.id) {
            debug!(monitor_id = monitor.id, "Monitor already running.");
            return;
        }
        if !(crate::monitor::MIN_INTERVAL_SECOND..=crate::monitor::MAX_INTERVAL_SECOND)
            .contains(&monitor.interval)
        {
            warn!(
                monitor_id = monitor.id,
                interval = monitor.interval,
                "Interval outside configured bounds; running it anyway."
            );
        }
        let stop = Arc::new(AtomicBool::new(false));
        let runtime = MonitorRuntime::new(monitor.clone(), self.deps.clone(), stop.clone());
        let handle = tokio::spawn(runtime.run());
        info!(monitor_id = monitor.id, name = %monitor.name, "Monitor started.");
        self.running.insert(
            monitor.id,
            RunningMonitor {
                monitor,
                handle,
                stop,
            },
        );
    }

    /// Cancels the pending tick and any in-flight probe. The aborted task
    /// drops its sockets and scoped resources at the next await point.
    pub fn stop(&self, monitor_id: i64) {
        if let Some((_, running)) = self.running.remove(&monitor_id) {
            running.stop.store(true, Ordering::SeqCst);
            running.handle.abort();
            self.deps.metrics.remove(&running.monitor);
            info!(monitor_id, "Monitor stopped.");
        }
    }

    /// Applies a changed configuration by restarting the runtime.
    pub async fn reload(&self, monitor: Monitor) {
        self.stop(monitor.id);
        self.deps.env.refresh(&self.deps.pool).await;
        self.start(monitor);
    }

    /// Live heartbeat/stat events for one owner's connections.
    pub fn subscribe(&self, owner_id: i64) -> broadcast::Receiver<LiveEvent> {
        self.deps.live_bus.subscribe(owner_id)
    }

    pub fn is_running(&self, monitor_id: i64) -> bool {
        self.running.contains_key(&monitor_id)
    }

    pub fn shutdown(&self) {
        let ids: Vec<i64> = self.running.iter().map(|entry| *entry.key()).collect();
        for monitor_id in ids {
            self.stop(monitor_id);
        }
    }
}
