//! Data types delivered to consumers (`system-stats` / `sidecar-status` payloads).
//! Keep this module minimal and stable: it defines the wire format.

use serde::Serialize;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CpuSnapshot {
    pub name: String,
    pub usage: f32,     // 0..100
    pub frequency: u64, // MHz
    pub cores: usize,
    pub logical_cores: usize,
    pub per_core_usage: Vec<f32>,
    // sidecar-sourced; None when the sidecar is down or stale
    pub temperature: Option<f32>,
    pub core_temperatures: Option<Vec<Option<f32>>>,
    pub power: Option<f32>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct RamSnapshot {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub usage_percent: f32,
}

impl RamSnapshot {
    pub fn new(total: u64, used: u64, available: u64) -> Self {
        // OS accounting can report used + available > total for a moment; trust total.
        let used = used.min(total);
        let available = available.min(total - used);
        let usage_percent = if total > 0 {
            (used as f64 / total as f64 * 100.0) as f32
        } else {
            0.0
        };
        Self {
            total,
            used,
            available,
            usage_percent,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct GpuSnapshot {
    pub name: String,
    pub usage: f32, // 0..100
    pub memory_total: u64,
    pub memory_used: u64,
    pub temperature: Option<f32>,
    pub hot_spot_temperature: Option<f32>,
    pub fan_speed: Option<f32>, // 0..100
    pub power: Option<f32>,
    pub core_clock: Option<f32>,   // MHz
    pub memory_clock: Option<f32>, // MHz
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SystemInfo {
    pub cpu_name: String,
    pub cpu_cores: usize,
    pub cpu_threads: usize,
    pub ram_total: u64,
    pub gpu_name: Option<String>,
    pub gpu_vram_total: Option<u64>,
    pub os_name: String,
    pub os_version: String,
    pub hostname: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cpu_usage: f32,
    pub mem_bytes: u64,
}

/// One merged telemetry record, produced once per tick and never mutated after publish.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Snapshot {
    pub cpu: CpuSnapshot,
    pub ram: RamSnapshot,
    pub gpu: Option<GpuSnapshot>,
    pub system_info: SystemInfo,
    pub processes: Vec<ProcessInfo>,
    pub timestamp: i64, // unix ms
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SidecarState {
    NotStarted,
    Starting,
    Running,
    Stopped,
    Error,
    RequiresAdmin,
    BinaryNotFound,
}

impl SidecarState {
    /// No automatic recovery is ever attempted from these.
    pub fn is_terminal(self) -> bool {
        matches!(self, SidecarState::RequiresAdmin | SidecarState::BinaryNotFound)
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SidecarStatus {
    pub state: SidecarState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub restart_count: u32,
    pub can_restart: bool,
}

impl SidecarStatus {
    pub fn not_started() -> Self {
        Self {
            state: SidecarState::NotStarted,
            message: None,
            restart_count: 0,
            can_restart: true,
        }
    }
}

/// Sort by CPU descending, then memory descending, then pid for a stable order.
pub fn rank_processes(procs: &mut [ProcessInfo]) {
    procs.sort_by(|a, b| {
        b.cpu_usage
            .partial_cmp(&a.cpu_usage)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.mem_bytes.cmp(&a.mem_bytes))
            .then_with(|| a.pid.cmp(&b.pid))
    });
}
