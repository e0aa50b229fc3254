//! Emission loop tests with a scripted sampler.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hwpulse::bus::{Event, EventBus};
use hwpulse::sampler::{Sampler, SamplerReading};
use hwpulse::scheduler::spawn_scheduler;
use hwpulse::types::{CpuSnapshot, ProcessInfo, RamSnapshot, Snapshot, SystemInfo};
use tokio::sync::broadcast;
use tokio::time::timeout;

struct FakeSampler {
    refreshes: Arc<AtomicUsize>,
    panic_on: Option<usize>,
}

impl FakeSampler {
    fn new() -> (Self, Arc<AtomicUsize>) {
        let n = Arc::new(AtomicUsize::new(0));
        (
            Self {
                refreshes: Arc::clone(&n),
                panic_on: None,
            },
            n,
        )
    }
}

impl Sampler for FakeSampler {
    fn refresh(&mut self) {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_on == Some(n) {
            panic!("sensor driver blew up");
        }
    }

    fn sample(&mut self) -> SamplerReading {
        SamplerReading {
            cpu: CpuSnapshot {
                name: "Fake CPU".into(),
                usage: 12.5,
                frequency: 3000,
                cores: 2,
                logical_cores: 4,
                per_core_usage: vec![10.0, 15.0, 12.0, 13.0],
                temperature: None,
                core_temperatures: None,
                power: None,
            },
            ram: RamSnapshot::new(8 << 30, 2 << 30, 6 << 30),
            gpu: None,
            info: SystemInfo {
                cpu_name: "Fake CPU".into(),
                cpu_cores: 2,
                cpu_threads: 4,
                ram_total: 8 << 30,
                gpu_name: None,
                gpu_vram_total: None,
                os_name: "FakeOS".into(),
                os_version: "1".into(),
                hostname: "bench".into(),
                uptime_seconds: 100,
            },
            processes: (1..=10)
                .map(|pid| ProcessInfo {
                    pid,
                    name: format!("proc{pid}"),
                    cpu_usage: 20.0 - pid as f32,
                    mem_bytes: 1024,
                })
                .collect(),
        }
    }
}

async fn next_snapshot(rx: &mut broadcast::Receiver<Event>) -> Arc<Snapshot> {
    loop {
        let ev = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no snapshot within 5s")
            .expect("bus closed");
        if let Event::SystemStats(s) = ev {
            return s;
        }
    }
}

#[tokio::test]
async fn publishes_ordered_snapshots() {
    let (sampler, refreshes) = FakeSampler::new();
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();
    let sched = spawn_scheduler(sampler, Duration::from_millis(100), 3, bus.clone(), None);

    let mut last = 0;
    for _ in 0..4 {
        let s = next_snapshot(&mut rx).await;
        assert!(s.timestamp >= last);
        last = s.timestamp;
        assert_eq!(s.processes.len(), 3);
        assert_eq!(s.processes[0].pid, 1);
        assert_eq!(s.cpu.per_core_usage.len(), s.cpu.logical_cores);
        assert!(s.gpu.is_none());
        assert!(s.cpu.temperature.is_none());
    }
    sched.shutdown().await;

    let after = refreshes.load(Ordering::SeqCst);
    assert!(after >= 4);
    assert_eq!(bus.get_system_stats().unwrap().timestamp, last);
    assert!(bus.history().len() >= 4);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(refreshes.load(Ordering::SeqCst), after, "no ticks after shutdown");
}

#[tokio::test]
async fn interval_below_minimum_is_raised() {
    let (sampler, _) = FakeSampler::new();
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();
    let sched = spawn_scheduler(sampler, Duration::from_millis(1), 8, bus, None);

    let a = next_snapshot(&mut rx).await;
    let b = next_snapshot(&mut rx).await;
    let c = next_snapshot(&mut rx).await;
    sched.shutdown().await;
    // two gaps of ~100ms each; wall-clock ms, so leave slack
    assert!(c.timestamp - a.timestamp >= 150, "{} {} {}", a.timestamp, b.timestamp, c.timestamp);
}

#[tokio::test]
async fn survives_a_panicking_sampler() {
    let (mut sampler, refreshes) = FakeSampler::new();
    sampler.panic_on = Some(2);
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();
    let sched = spawn_scheduler(sampler, Duration::from_millis(100), 8, bus, None);

    for _ in 0..3 {
        next_snapshot(&mut rx).await;
    }
    // the panicking tick published nothing, the loop kept going
    assert!(refreshes.load(Ordering::SeqCst) >= 4);
    sched.shutdown().await;
}

#[cfg(unix)]
#[tokio::test]
async fn merges_sidecar_and_reaps_it_on_shutdown() {
    use hwpulse::supervisor::{spawn_supervisor, SidecarBinary, SidecarConfig};

    let dir = tempfile::tempdir().unwrap();
    let pidfile = dir.path().join("pid");
    let script = format!(
        "echo $$ > '{}'; while true; do echo '{{\"cpu\":{{\"temperature\":50.0,\"power\":20.0}}}}'; sleep 0.05; done",
        pidfile.display()
    );
    let mut cfg = SidecarConfig::new(
        SidecarBinary::Path("/bin/sh".into()),
        Duration::from_millis(100),
    );
    cfg.args = vec!["-c".into(), script, "sidecar".into()];

    let (sampler, _) = FakeSampler::new();
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();
    let sidecar = spawn_supervisor(cfg, bus.clone());
    let sched = spawn_scheduler(sampler, Duration::from_millis(100), 8, bus.clone(), Some(sidecar));

    let merged = timeout(Duration::from_secs(5), async {
        loop {
            let s = next_snapshot(&mut rx).await;
            if s.cpu.temperature.is_some() {
                return s;
            }
        }
    })
    .await
    .expect("sidecar data never merged");
    assert_eq!(merged.cpu.temperature, Some(50.0));
    assert_eq!(merged.cpu.power, Some(20.0));
    assert_eq!(merged.cpu.usage, 12.5);

    let pid = std::fs::read_to_string(&pidfile).unwrap().trim().to_string();
    sched.shutdown().await;

    let alive = std::process::Command::new("kill")
        .args(["-0", &pid])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);
    assert!(!alive, "sidecar {pid} still running after shutdown");
}
