//! Live event fan-out to connected clients, keyed by owner identity.
//!
//! Delivery is best-effort: sends never block a beat loop, and stat
//! computation is skipped entirely while an owner has no subscribers.

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// One live update for an owner's dashboard connections.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum LiveEvent {
    Heartbeat(serde_json::Value),
    #[serde(rename_all = "camelCase")]
    AvgPing {
        monitor_id: i64,
        avg_ping: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    Uptime {
        monitor_id: i64,
        period_hours: u32,
        ratio: f64,
    },
    #[serde(rename_all = "camelCase")]
    CertInfo {
        monitor_id: i64,
        info: serde_json::Value,
    },
}

pub struct LiveBus {
    channels: DashMap<i64, broadcast::Sender<LiveEvent>>,
}

impl Default for LiveBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveBus {
    pub fn new() -> Self {
        LiveBus {
            channels: DashMap::new(),
        }
    }

    /// Subscribes to every live event of one owner.
    pub fn subscribe(&self, owner_id: i64) -> broadcast::Receiver<LiveEvent> {
        self.channels
            .entry(owner_id)
            .or_insert_with(|| broadcast::channel(256).0)
            .subscribe()
    }

    /// True when at least one subscriber is connected for the owner. Beat
    /// loops use this to skip stat queries nobody would see.
    pub fn has_subscribers(&self, owner_id: i64) -> bool {
        self.channels
            .get(&owner_id)
            .map(|sender| sender.receiver_count() > 0)
            .unwrap_or(false)
    }

    pub fn emit(&self, owner_id: i64, event: LiveEvent) {
        if let Some(sender) = self.channels.get(&owner_id) {
            if sender.send(event).is_err() {
                // All receivers are gone; the channel stays for the next
                // subscriber.
                debug!(owner_id, "Dropped live event without subscribers.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_events_for_its_owner_only() {
        let bus = LiveBus::new();
        let mut rx = bus.subscribe(7);

        bus.emit(
            7,
            LiveEvent::Uptime {
                monitor_id: 1,
                period_hours: 24,
                ratio: 1.0,
            },
        );
        bus.emit(
            8,
            LiveEvent::Uptime {
                monitor_id: 2,
                period_hours: 24,
                ratio: 0.0,
            },
        );

        match rx.try_recv().unwrap() {
            LiveEvent::Uptime { monitor_id, .. } => assert_eq!(monitor_id, 1),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn has_subscribers_tracks_receiver_lifetime() {
        let bus = LiveBus::new();
        assert!(!bus.has_subscribers(1));

        let rx = bus.subscribe(1);
        assert!(bus.has_subscribers(1));

        drop(rx);
        assert!(!bus.has_subscribers(1));
    }

    #[test]
    fn events_serialize_with_tagged_names() {
        let event = LiveEvent::AvgPing {
            monitor_id: 3,
            avg_ping: Some(12.5),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "avgPing");
        assert_eq!(json["data"]["monitorId"], 3);
    }
}
