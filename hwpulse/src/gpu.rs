// gpu.rs
//! Coarse GPU utilization/VRAM through gfxinfo. Temperatures, clocks and fans
//! only ever come from the sidecar.
use gfxinfo::active_gpu;
use once_cell::sync::OnceCell;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::types::GpuSnapshot;

// Avoid rescanning the driver every tick
const TTL: Duration = Duration::from_millis(1500);

fn gpu_enabled() -> bool {
    static ON: OnceCell<bool> = OnceCell::new();
    *ON.get_or_init(|| {
        std::env::var("HWPULSE_GPU")
            .map(|v| v != "0")
            .unwrap_or(true)
    })
}

pub fn probe_active_gpu() -> Result<GpuSnapshot, Box<dyn std::error::Error>> {
    let gpu = active_gpu()?;
    let info = gpu.info();

    Ok(GpuSnapshot {
        name: gpu.model().to_string(),
        usage: (info.load_pct() as f32).clamp(0.0, 100.0),
        memory_total: info.total_vram(),
        memory_used: info.used_vram(),
        temperature: None,
        hot_spot_temperature: None,
        fan_speed: None,
        power: None,
        core_clock: None,
        memory_clock: None,
    })
}

/// Remembers whether a GPU exists at all so a machine without one is probed once.
pub struct GpuProbe {
    enabled: bool,
    checked: bool,
    present: bool,
    cached: Option<(Instant, GpuSnapshot)>,
}

impl GpuProbe {
    pub fn new() -> Self {
        Self {
            enabled: gpu_enabled(),
            checked: false,
            present: false,
            cached: None,
        }
    }

    pub fn read(&mut self) -> Option<GpuSnapshot> {
        if !self.enabled || (self.checked && !self.present) {
            return None;
        }
        if let Some((at, g)) = &self.cached {
            if at.elapsed() < TTL {
                return Some(g.clone());
            }
        }
        let v = match probe_active_gpu() {
            Ok(g) => Some(g),
            Err(e) => {
                if self.checked {
                    warn!("gpu probe failed: {e}");
                } else {
                    debug!("no gpu recognized: {e}");
                }
                None
            }
        };
        // First probe records presence; later failures just fall back to the cache.
        if !self.checked {
            self.checked = true;
            self.present = v.is_some();
        }
        match v {
            Some(g) => {
                self.cached = Some((Instant::now(), g.clone()));
                Some(g)
            }
            None => self.cached.as_ref().map(|(_, g)| g.clone()),
        }
    }
}

impl Default for GpuProbe {
    fn default() -> Self {
        Self::new()
    }
}
