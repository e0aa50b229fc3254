//! Fuses one sampler reading with the latest sidecar reading into a `Snapshot`.
//!
//! Pure: the result depends only on the arguments and the merge policy. CPU, RAM
//! and processes always come from the sampler; sensor-only fields come from the
//! sidecar, and only while its reading is inside the staleness window.

use std::time::{Duration, Instant};

use crate::protocol::{SidecarCpu, SidecarGpu, TimedReading};
use crate::sampler::SamplerReading;
use crate::types::{CpuSnapshot, GpuSnapshot, Snapshot};

#[derive(Debug, Clone, Copy)]
pub struct Merger {
    /// Max age of a sidecar reading still merged.
    pub staleness: Duration,
    /// Processes carried in the snapshot.
    pub top_processes: usize,
}

impl Merger {
    /// Staleness window of two ticks.
    pub fn for_interval(interval: Duration, top_processes: usize) -> Self {
        Self {
            staleness: interval * 2,
            top_processes,
        }
    }

    pub fn is_fresh(&self, reading: &TimedReading, now: Instant) -> bool {
        now.saturating_duration_since(reading.received_at) <= self.staleness
    }

    pub fn merge(
        &self,
        base: &SamplerReading,
        sidecar: Option<&TimedReading>,
        now: Instant,
        timestamp: i64,
    ) -> Snapshot {
        let live = sidecar
            .filter(|r| self.is_fresh(r, now))
            .map(|r| &r.reading);

        let cpu = merge_cpu(&base.cpu, live.and_then(|r| r.cpu.as_ref()));

        let sidecar_gpus = live.map(|r| r.gpu.as_slice()).unwrap_or(&[]);
        let gpu = match &base.gpu {
            Some(g) => Some(merge_gpu(g, pick_gpu(&g.name, sidecar_gpus))),
            None => sidecar_gpus.first().map(gpu_from_sidecar),
        };

        let mut processes = base.processes.clone();
        processes.truncate(self.top_processes);

        Snapshot {
            cpu,
            ram: base.ram.clone(),
            gpu,
            system_info: base.info.clone(),
            processes,
            timestamp,
        }
    }
}

fn merge_cpu(base: &CpuSnapshot, sc: Option<&SidecarCpu>) -> CpuSnapshot {
    let mut cpu = base.clone();
    cpu.temperature = None;
    cpu.core_temperatures = None;
    cpu.power = None;
    if let Some(sc) = sc {
        cpu.temperature = finite(sc.temperature).or(finite(sc.package_temperature));
        if sc.core_temperatures.iter().any(|t| finite(*t).is_some()) {
            cpu.core_temperatures = Some(sc.core_temperatures.iter().map(|t| finite(*t)).collect());
        }
        cpu.power = non_negative(sc.power);
    }
    cpu
}

/// Match the sampler's GPU by case-insensitive name containment; fall back to the first entry.
pub fn pick_gpu<'a>(name: &str, gpus: &'a [SidecarGpu]) -> Option<&'a SidecarGpu> {
    let want = name.to_lowercase();
    gpus.iter()
        .find(|g| {
            g.name.as_deref().is_some_and(|n| {
                let n = n.to_lowercase();
                !n.is_empty() && !want.is_empty() && (n.contains(&want) || want.contains(&n))
            })
        })
        .or_else(|| gpus.first())
}

fn merge_gpu(base: &GpuSnapshot, sc: Option<&SidecarGpu>) -> GpuSnapshot {
    let mut gpu = base.clone();
    gpu.usage = base.usage.clamp(0.0, 100.0);
    let sc = sc.cloned().unwrap_or_default();
    gpu.temperature = finite(sc.temperature);
    gpu.hot_spot_temperature = finite(sc.hot_spot_temperature);
    gpu.fan_speed = percent(sc.fan_speed);
    gpu.power = non_negative(sc.power);
    gpu.core_clock = non_negative(sc.core_clock);
    gpu.memory_clock = non_negative(sc.memory_clock);
    gpu
}

// The sampler saw no GPU but the sidecar does: show what the sidecar knows.
fn gpu_from_sidecar(sc: &SidecarGpu) -> GpuSnapshot {
    let base = GpuSnapshot {
        name: sc.name.clone().unwrap_or_else(|| "Unknown GPU".into()),
        usage: percent(sc.load).unwrap_or(0.0),
        memory_total: 0,
        memory_used: 0,
        temperature: None,
        hot_spot_temperature: None,
        fan_speed: None,
        power: None,
        core_clock: None,
        memory_clock: None,
    };
    merge_gpu(&base, Some(sc))
}

fn finite(v: Option<f32>) -> Option<f32> {
    v.filter(|x| x.is_finite())
}

fn non_negative(v: Option<f32>) -> Option<f32> {
    finite(v).filter(|x| *x >= 0.0)
}

fn percent(v: Option<f32>) -> Option<f32> {
    finite(v).map(|x| x.clamp(0.0, 100.0))
}
