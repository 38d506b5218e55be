//! Windowed availability arithmetic with a process-wide result cache.
//!
//! Each heartbeat covers the `duration` seconds since its predecessor.
//! Beats near the window edge are trimmed to the part inside the window so
//! a 1h-interval monitor does not leak coverage across the boundary. All
//! trimming is integer seconds over UTC timestamps.

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use sqlx::SqlitePool;

use crate::db::services as db;
use crate::monitor::status::Status;

pub struct UptimeService {
    cache: DashMap<(i64, u32), f64>,
}

impl Default for UptimeService {
    fn default() -> Self {
        Self::new()
    }
}

impl UptimeService {
    pub fn new() -> Self {
        UptimeService {
            cache: DashMap::new(),
        }
    }

    /// Drops every cached window of one monitor. Called whenever a beat
    /// lands for it.
    pub fn invalidate(&self, monitor_id: i64) {
        self.cache.retain(|(cached_id, _), _| *cached_id != monitor_id);
    }

    /// Availability ratio in `[0, 1]` over the trailing window.
    /// MAINTENANCE counts as available.
    pub async fn uptime(
        &self,
        pool: &SqlitePool,
        monitor_id: i64,
        window_hours: u32,
    ) -> Result<f64, sqlx::Error> {
        if let Some(cached) = self.cache.get(&(monitor_id, window_hours)) {
            return Ok(*cached);
        }

        let window_start = Utc::now() - ChronoDuration::hours(window_hours as i64);
        let beats = db::list_since(pool, monitor_id, window_start).await?;

        let mut total_seconds: i64 = 0;
        let mut up_seconds: i64 = 0;
        for beat in &beats {
            let inside_window = (beat.time - window_start).num_seconds();
            let covered = beat.duration.min(inside_window).max(0);
            total_seconds += covered;
            if beat.status.counts_as_up() {
                up_seconds += covered;
            }
        }

        let ratio = if total_seconds > 0 {
            up_seconds as f64 / total_seconds as f64
        } else {
            // Not enough history to cover any duration: a lone UP beat
            // counts as fully available, anything else as unavailable.
            match beats.last() {
                Some(beat) if beat.status == Status::Up => 1.0,
                _ => 0.0,
            }
        };

        self.cache.insert((monitor_id, window_hours), ratio);
        Ok(ratio)
    }

    /// Mean ping in milliseconds over the trailing window; `None` without
    /// any pinged beat.
    pub async fn avg_ping(
        &self,
        pool: &SqlitePool,
        monitor_id: i64,
        window_hours: u32,
    ) -> Result<Option<f64>, sqlx::Error> {
        let window_start = Utc::now() - ChronoDuration::hours(window_hours as i64);
        db::avg_ping(pool, monitor_id, window_start).await
    }
}
