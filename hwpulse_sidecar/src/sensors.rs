//! Temperature discovery over `sysinfo::Components`, by sensor label.

use sysinfo::Components;

use crate::types::{CpuReading, GpuReading};

// Anything past this is a mislabelled sensor, not a core index.
const MAX_CORES: usize = 256;

/// One sensor as reported by the OS.
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    pub label: String,
    pub temperature: Option<f32>,
    pub max: Option<f32>,
}

pub struct Sensors {
    components: Components,
}

impl Sensors {
    pub fn new() -> Self {
        Self {
            components: Components::new_with_refreshed_list(),
        }
    }

    pub fn probes(&mut self) -> Vec<Probe> {
        self.components.refresh(true);
        self.components
            .iter()
            .map(|c| Probe {
                label: c.label().to_string(),
                temperature: c.temperature().filter(|t| t.is_finite()),
                max: c.max().filter(|t| t.is_finite()),
            })
            .collect()
    }
}

impl Default for Sensors {
    fn default() -> Self {
        Self::new()
    }
}

fn is_cpu_label(label: &str) -> bool {
    label.contains("cpu")
        || label.contains("package")
        || label.contains("tctl")
        || label.contains("tdie")
        || label.contains("coretemp")
        || label.contains("k10temp")
}

fn is_gpu_label(label: &str) -> bool {
    label.contains("gpu") || label.contains("nouveau") || label.contains("radeon")
}

fn is_hot_spot(label: &str) -> bool {
    label.contains("junction") || label.contains("hotspot") || label.contains("hot spot")
}

/// "coretemp Core 3" -> 3
fn core_index(label: &str) -> Option<usize> {
    let (_, rest) = label.rsplit_once("core")?;
    rest.trim().parse().ok().filter(|i| *i < MAX_CORES)
}

fn hottest(temps: impl Iterator<Item = f32>) -> Option<f32> {
    temps.max_by(|a, b| a.total_cmp(b))
}

pub fn cpu_reading(probes: &[Probe], name: &str) -> Option<CpuReading> {
    let cpu: Vec<(String, &Probe)> = probes
        .iter()
        .map(|p| (p.label.to_lowercase(), p))
        .filter(|(l, _)| is_cpu_label(l) && !is_gpu_label(l))
        .collect();
    if cpu.is_empty() {
        return None;
    }

    let package_temperature = cpu
        .iter()
        .filter(|(l, _)| l.contains("package") || l.contains("tctl") || l.contains("tdie"))
        .find_map(|(_, p)| p.temperature);

    let mut core_temperatures: Vec<Option<f32>> = Vec::new();
    for (l, p) in &cpu {
        if let (Some(i), Some(t)) = (core_index(l), p.temperature) {
            if core_temperatures.len() <= i {
                core_temperatures.resize(i + 1, None);
            }
            core_temperatures[i] = Some(t);
        }
    }

    let reading = CpuReading {
        name: name.to_string(),
        temperature: hottest(cpu.iter().filter_map(|(_, p)| p.temperature)),
        package_temperature,
        core_temperatures,
        max_temperature: hottest(cpu.iter().filter_map(|(_, p)| p.max)),
    };
    reading.temperature.map(|_| reading)
}

pub fn gpu_readings(probes: &[Probe]) -> Vec<GpuReading> {
    let gpu: Vec<(String, &Probe)> = probes
        .iter()
        .map(|p| (p.label.to_lowercase(), p))
        .filter(|(l, _)| is_gpu_label(l))
        .collect();

    let temperature = hottest(
        gpu.iter()
            .filter(|(l, _)| !is_hot_spot(l))
            .filter_map(|(_, p)| p.temperature),
    );
    let hot_spot_temperature = hottest(
        gpu.iter()
            .filter(|(l, _)| is_hot_spot(l))
            .filter_map(|(_, p)| p.temperature),
    );
    if temperature.is_none() && hot_spot_temperature.is_none() {
        return Vec::new();
    }

    let first = gpu.first().map(|(l, p)| (l.as_str(), p.label.as_str()));
    let (vendor, name) = match first {
        Some((l, _)) if l.contains("amdgpu") || l.contains("radeon") => ("amd", "AMD GPU"),
        Some((l, _)) if l.contains("nouveau") || l.contains("nvidia") => ("nvidia", "NVIDIA GPU"),
        Some((l, _)) if l.contains("i915") || l.contains("intel") => ("intel", "Intel GPU"),
        Some((_, label)) => ("unknown", label),
        None => ("unknown", "GPU"),
    };
    vec![GpuReading {
        name: name.to_string(),
        vendor: vendor.to_string(),
        temperature,
        hot_spot_temperature,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(label: &str, t: Option<f32>) -> Probe {
        Probe {
            label: label.into(),
            temperature: t,
            max: t.map(|t| t + 20.0),
        }
    }

    #[test]
    fn intel_coretemp_layout() {
        let probes = vec![
            probe("coretemp Package id 0", Some(61.0)),
            probe("coretemp Core 0", Some(58.0)),
            probe("coretemp Core 2", Some(63.0)),
            probe("acpitz temp1", Some(27.8)),
        ];
        let cpu = cpu_reading(&probes, "Intel(R) Core(TM) i5").unwrap();
        assert_eq!(cpu.temperature, Some(63.0));
        assert_eq!(cpu.package_temperature, Some(61.0));
        assert_eq!(cpu.core_temperatures, vec![Some(58.0), None, Some(63.0)]);
        assert_eq!(cpu.max_temperature, Some(83.0));
        assert_eq!(cpu.name, "Intel(R) Core(TM) i5");
    }

    #[test]
    fn amd_tctl_without_cores() {
        let probes = vec![probe("k10temp Tctl", Some(70.5))];
        let cpu = cpu_reading(&probes, "AMD Ryzen").unwrap();
        assert_eq!(cpu.temperature, Some(70.5));
        assert_eq!(cpu.package_temperature, Some(70.5));
        assert!(cpu.core_temperatures.is_empty());
    }

    #[test]
    fn no_cpu_sensor_yields_none() {
        assert!(cpu_reading(&[probe("acpitz temp1", Some(30.0))], "x").is_none());
        assert!(cpu_reading(&[probe("coretemp Core 0", None)], "x").is_none());
    }

    #[test]
    fn amdgpu_edge_and_junction() {
        let probes = vec![
            probe("amdgpu edge", Some(45.0)),
            probe("amdgpu junction", Some(52.0)),
            probe("coretemp Core 0", Some(50.0)),
        ];
        let gpus = gpu_readings(&probes);
        assert_eq!(gpus.len(), 1);
        assert_eq!(gpus[0].vendor, "amd");
        assert_eq!(gpus[0].temperature, Some(45.0));
        assert_eq!(gpus[0].hot_spot_temperature, Some(52.0));
        assert!(gpu_readings(&probes[2..]).is_empty());
    }

    #[test]
    fn core_index_parsing() {
        assert_eq!(core_index("coretemp core 12"), Some(12));
        assert_eq!(core_index("coretemp package id 0"), None);
        assert_eq!(core_index("core 9999"), None);
    }
}
