//! Outbound event delivery: fire-and-forget broadcast plus "latest value" slots
//! for on-demand pulls.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tracing::trace;

use crate::history::SnapshotHistory;
use crate::types::{SidecarStatus, Snapshot};

// Per-subscriber backlog; a slower consumer lags and skips rather than growing memory.
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum Event {
    #[serde(rename = "system-stats")]
    SystemStats(Arc<Snapshot>),
    #[serde(rename = "sidecar-status")]
    SidecarStatus(SidecarStatus),
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    latest: Arc<watch::Sender<Option<Arc<Snapshot>>>>,
    status: Arc<watch::Sender<SidecarStatus>>,
    history: Arc<Mutex<SnapshotHistory>>,
}

impl EventBus {
    pub fn new(history_len: usize) -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (latest, _) = watch::channel(None);
        let (status, _) = watch::channel(SidecarStatus::not_started());
        Self {
            tx,
            latest: Arc::new(latest),
            status: Arc::new(status),
            history: Arc::new(Mutex::new(SnapshotHistory::new(history_len))),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish_snapshot(&self, snap: Snapshot) -> Arc<Snapshot> {
        let snap = Arc::new(snap);
        self.latest.send_replace(Some(Arc::clone(&snap)));
        if let Ok(mut h) = self.history.lock() {
            h.push(Arc::clone(&snap));
        }
        self.send(Event::SystemStats(Arc::clone(&snap)));
        snap
    }

    pub fn publish_status(&self, status: SidecarStatus) {
        self.status.send_replace(status.clone());
        self.send(Event::SidecarStatus(status));
    }

    fn send(&self, event: Event) {
        // Err only means nobody is listening right now.
        if self.tx.send(event).is_err() {
            trace!("no subscribers; event dropped");
        }
    }

    /// Latest published snapshot, if any tick has completed.
    pub fn get_system_stats(&self) -> Option<Arc<Snapshot>> {
        self.latest.borrow().clone()
    }

    pub fn sidecar_status(&self) -> SidecarStatus {
        self.status.borrow().clone()
    }

    pub fn history(&self) -> Vec<Arc<Snapshot>> {
        self.history
            .lock()
            .map(|h| h.to_vec())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CpuSnapshot, RamSnapshot, SidecarState, SystemInfo};

    fn snapshot(ts: i64) -> Snapshot {
        Snapshot {
            cpu: CpuSnapshot {
                name: "cpu".into(),
                usage: 1.0,
                frequency: 0,
                cores: 1,
                logical_cores: 1,
                per_core_usage: vec![1.0],
                temperature: None,
                core_temperatures: None,
                power: None,
            },
            ram: RamSnapshot::new(10, 5, 5),
            gpu: None,
            system_info: SystemInfo {
                cpu_name: "cpu".into(),
                cpu_cores: 1,
                cpu_threads: 1,
                ram_total: 10,
                gpu_name: None,
                gpu_vram_total: None,
                os_name: "os".into(),
                os_version: String::new(),
                hostname: "host".into(),
                uptime_seconds: 0,
            },
            processes: Vec::new(),
            timestamp: ts,
        }
    }

    #[test]
    fn publish_without_subscribers_still_updates_latest() {
        let bus = EventBus::new(4);
        assert!(bus.get_system_stats().is_none());
        bus.publish_snapshot(snapshot(1));
        bus.publish_snapshot(snapshot(2));
        assert_eq!(bus.get_system_stats().unwrap().timestamp, 2);
        assert_eq!(bus.history().len(), 2);
    }

    #[test]
    fn history_is_capped() {
        let bus = EventBus::new(2);
        for ts in 0..5 {
            bus.publish_snapshot(snapshot(ts));
        }
        let ts: Vec<i64> = bus.history().iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![3, 4]);
    }

    #[tokio::test]
    async fn subscribers_see_both_event_kinds() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        bus.publish_snapshot(snapshot(9));
        bus.publish_status(SidecarStatus {
            state: SidecarState::Running,
            message: None,
            restart_count: 0,
            can_restart: true,
        });
        assert!(matches!(rx.recv().await.unwrap(), Event::SystemStats(s) if s.timestamp == 9));
        assert!(matches!(
            rx.recv().await.unwrap(),
            Event::SidecarStatus(s) if s.state == SidecarState::Running
        ));
        assert_eq!(bus.sidecar_status().state, SidecarState::Running);
    }

    #[test]
    fn event_wire_shape() {
        let js = serde_json::to_value(Event::SystemStats(Arc::new(snapshot(3)))).unwrap();
        assert_eq!(js["event"], "system-stats");
        assert_eq!(js["payload"]["timestamp"], 3);
        let js = serde_json::to_value(Event::SidecarStatus(SidecarStatus::not_started())).unwrap();
        assert_eq!(js["event"], "sidecar-status");
        assert_eq!(js["payload"]["state"], "not_started");
    }
}
