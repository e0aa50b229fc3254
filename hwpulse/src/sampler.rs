//! OS-level counters via sysinfo: CPU, RAM, coarse GPU, top processes.
//!
//! `refresh()` pulls fresh counters and must run exactly once per tick; `sample()`
//! only reads what the last refresh cached. CPU% is a delta between two refreshes,
//! so a second refresh inside one tick would shorten the window and skew it.

use std::time::Instant;
use sysinfo::{
    CpuRefreshKind, MemoryRefreshKind, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System,
};
use tracing::{info, warn};

use crate::gpu::GpuProbe;
use crate::types::{
    rank_processes, CpuSnapshot, GpuSnapshot, ProcessInfo, RamSnapshot, SystemInfo,
};

/// How many ranked processes the sampler keeps; the snapshot shows fewer.
pub const PROCESS_POOL: usize = 32;

/// Everything the OS side knows for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerReading {
    pub cpu: CpuSnapshot,
    pub ram: RamSnapshot,
    pub gpu: Option<GpuSnapshot>,
    pub info: SystemInfo,
    pub processes: Vec<ProcessInfo>,
}

pub trait Sampler: Send + 'static {
    /// Pull fresh OS counters. Called once per tick, before `sample`.
    fn refresh(&mut self);
    /// Read the counters cached by the last `refresh`.
    fn sample(&mut self) -> SamplerReading;
}

pub struct SystemSampler {
    sys: System,
    gpu: GpuProbe,
    info: SystemInfo,
    // fixed at construction so per-core length never changes between ticks
    logical_cores: usize,
    uptime_base: u64,
    started: Instant,
    refresh_ok: bool,
    last_good: Option<(CpuSnapshot, RamSnapshot)>,
}

impl SystemSampler {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything())
            .with_processes(ProcessRefreshKind::nothing().with_cpu().with_memory());
        let sys = System::new_with_specifics(refresh_kind);

        let mut gpu = GpuProbe::new();
        let first_gpu = gpu.read();

        let cpus = sys.cpus();
        let cpu_name = cpus
            .first()
            .map(|c| c.brand().trim().to_string())
            .unwrap_or_else(|| "Unknown CPU".to_string());
        let logical_cores = cpus.len();
        let info = SystemInfo {
            cpu_name,
            cpu_cores: System::physical_core_count().unwrap_or(logical_cores),
            cpu_threads: logical_cores,
            ram_total: sys.total_memory(),
            gpu_name: first_gpu.as_ref().map(|g| g.name.clone()),
            gpu_vram_total: first_gpu.as_ref().map(|g| g.memory_total),
            os_name: System::name().unwrap_or_else(|| "Unknown".to_string()),
            os_version: System::os_version().unwrap_or_default(),
            hostname: System::host_name().unwrap_or_else(|| "unknown".into()),
            uptime_seconds: System::uptime(),
        };
        info!(
            cpu = %info.cpu_name,
            threads = logical_cores,
            gpu = info.gpu_name.as_deref().unwrap_or("none"),
            "system sampler ready"
        );

        Self {
            sys,
            gpu,
            uptime_base: info.uptime_seconds,
            info,
            logical_cores,
            started: Instant::now(),
            refresh_ok: true,
            last_good: None,
        }
    }

    pub fn system_info(&self) -> &SystemInfo {
        &self.info
    }

    fn read_cpu(&self) -> Option<CpuSnapshot> {
        let cpus = self.sys.cpus();
        if cpus.is_empty() {
            return None;
        }
        let mut per_core_usage: Vec<f32> = cpus
            .iter()
            .map(|c| sanitize_pct(c.cpu_usage()))
            .collect();
        per_core_usage.resize(self.logical_cores, 0.0);
        Some(CpuSnapshot {
            name: self.info.cpu_name.clone(),
            usage: sanitize_pct(self.sys.global_cpu_usage()),
            frequency: cpus.first().map(|c| c.frequency()).unwrap_or(0),
            cores: self.info.cpu_cores,
            logical_cores: self.logical_cores,
            per_core_usage,
            temperature: None,
            core_temperatures: None,
            power: None,
        })
    }

    fn read_ram(&self) -> Option<RamSnapshot> {
        let total = self.sys.total_memory();
        if total == 0 {
            return None;
        }
        Some(RamSnapshot::new(
            total,
            self.sys.used_memory(),
            self.sys.available_memory(),
        ))
    }

    fn read_processes(&self) -> Vec<ProcessInfo> {
        let n_cpus = self.logical_cores.max(1) as f32;
        let mut procs: Vec<ProcessInfo> = self
            .sys
            .processes()
            .values()
            .map(|p| ProcessInfo {
                pid: p.pid().as_u32(),
                name: p.name().to_string_lossy().into_owned(),
                // single whole-machine scale: a saturated 8-thread process reads 100, not 800
                cpu_usage: sanitize_pct(p.cpu_usage() / n_cpus),
                mem_bytes: p.memory(),
            })
            .filter(|p| p.cpu_usage > 0.0 || p.mem_bytes > 0)
            .collect();
        rank_processes(&mut procs);
        procs.truncate(PROCESS_POOL);
        procs
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for SystemSampler {
    fn refresh(&mut self) {
        let sys = &mut self.sys;
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            sys.refresh_cpu_specifics(CpuRefreshKind::nothing().with_cpu_usage().with_frequency());
            sys.refresh_memory();
            sys.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::nothing().with_cpu().with_memory(),
            );
        }));
        self.refresh_ok = match res {
            Ok(()) => true,
            Err(e) => {
                warn!("sysinfo refresh panicked: {e:?}");
                false
            }
        };
    }

    fn sample(&mut self) -> SamplerReading {
        let fresh = if self.refresh_ok {
            self.read_cpu().zip(self.read_ram())
        } else {
            None
        };
        let (cpu, ram) = match (fresh, &self.last_good) {
            (Some(v), _) => {
                self.last_good = Some(v.clone());
                v
            }
            (None, Some(prev)) => {
                info!("system counters unavailable this tick; reusing last known values");
                prev.clone()
            }
            (None, None) => {
                info!("system counters unavailable; reporting zeros until the first good read");
                (self.empty_cpu(), RamSnapshot::new(self.info.ram_total, 0, 0))
            }
        };

        let mut info = self.info.clone();
        info.uptime_seconds = self.uptime_base + self.started.elapsed().as_secs();

        SamplerReading {
            cpu,
            ram,
            gpu: self.gpu.read(),
            info,
            processes: self.read_processes(),
        }
    }
}

impl SystemSampler {
    fn empty_cpu(&self) -> CpuSnapshot {
        CpuSnapshot {
            name: self.info.cpu_name.clone(),
            usage: 0.0,
            frequency: 0,
            cores: self.info.cpu_cores,
            logical_cores: self.logical_cores,
            per_core_usage: vec![0.0; self.logical_cores],
            temperature: None,
            core_temperatures: None,
            power: None,
        }
    }
}

fn sanitize_pct(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 100.0)
    } else {
        0.0
    }
}
