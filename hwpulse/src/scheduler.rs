//! Emission loop: every tick refreshes the OS counters, merges in the latest
//! sidecar reading and publishes one snapshot.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::bus::EventBus;
use crate::merge::Merger;
use crate::sampler::Sampler;
use crate::supervisor::{wait_stop, SidecarHandle};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);
// Below this the OS queries cost more than they are worth.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

pub fn clamp_interval(d: Duration) -> Duration {
    d.max(MIN_INTERVAL)
}

pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop ticking, then stop the sidecar (child killed and reaped) before returning.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!("emission loop ended abnormally: {e}");
        }
    }
}

pub fn spawn_scheduler<S: Sampler>(
    sampler: S,
    interval: Duration,
    top_processes: usize,
    bus: EventBus,
    sidecar: Option<SidecarHandle>,
) -> SchedulerHandle {
    let interval = clamp_interval(interval);
    let (stop_tx, stop_rx) = watch::channel(false);
    let sched = Scheduler {
        sampler: Arc::new(Mutex::new(sampler)),
        merger: Merger::for_interval(interval, top_processes),
        interval,
        bus,
        sidecar,
        last_timestamp: 0,
    };
    SchedulerHandle {
        stop: stop_tx,
        task: tokio::spawn(sched.run(stop_rx)),
    }
}

struct Scheduler<S> {
    // std Mutex: only ever locked inside spawn_blocking
    sampler: Arc<Mutex<S>>,
    merger: Merger,
    interval: Duration,
    bus: EventBus,
    sidecar: Option<SidecarHandle>,
    last_timestamp: i64,
}

impl<S: Sampler> Scheduler<S> {
    async fn run(mut self, mut stop: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        // An overrunning tick makes the loop skip firings instead of bursting to catch up.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("emission loop started ({} ms)", self.interval.as_millis());

        loop {
            let stopped = tokio::select! {
                _ = wait_stop(&mut stop) => true,
                _ = ticker.tick() => false,
            };
            if stopped {
                break;
            }
            let started = Instant::now();
            if let Err(e) = self.tick().await {
                warn!("tick failed, previous snapshot stays current: {e}");
            }
            let took = started.elapsed();
            if took > self.interval {
                debug!("tick took {took:?}; skipping missed ticks");
            }
        }

        if let Some(sidecar) = self.sidecar.take() {
            sidecar.shutdown().await;
        }
        info!("emission loop stopped");
    }

    async fn tick(&mut self) -> Result<(), JoinError> {
        let sampler = Arc::clone(&self.sampler);
        let base = tokio::task::spawn_blocking(move || {
            // A panic in an earlier tick poisons the lock; the sampler itself is still usable.
            let mut s = sampler.lock().unwrap_or_else(PoisonError::into_inner);
            s.refresh();
            s.sample()
        })
        .await?;

        let now = Instant::now();
        let timestamp = chrono::Utc::now()
            .timestamp_millis()
            .max(self.last_timestamp);
        self.last_timestamp = timestamp;

        let reading = self.sidecar.as_ref().and_then(|s| s.latest_reading());
        let snap = self.merger.merge(&base, reading.as_ref(), now, timestamp);
        self.bus.publish_snapshot(snap);
        Ok(())
    }
}
