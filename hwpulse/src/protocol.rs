//! Types that mirror the sensor sidecar's JSON line protocol.
//!
//! One object per line on the sidecar's stdout. Every key is optional on the
//! way in; types are not.

use serde::Deserialize;
use std::time::Instant;

use crate::error::ProtocolError;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SidecarReading {
    #[serde(default)]
    pub cpu: Option<SidecarCpu>,
    #[serde(default)]
    pub gpu: Vec<SidecarGpu>,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SidecarCpu {
    pub name: Option<String>,
    pub temperature: Option<f32>,
    pub package_temperature: Option<f32>,
    #[serde(default)]
    pub core_temperatures: Vec<Option<f32>>,
    pub max_temperature: Option<f32>,
    pub power: Option<f32>,
    #[serde(default)]
    pub core_powers: Vec<Option<f32>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SidecarGpu {
    pub name: Option<String>,
    pub vendor: Option<String>,
    pub temperature: Option<f32>,
    pub hot_spot_temperature: Option<f32>,
    pub power: Option<f32>,
    pub core_clock: Option<f32>,
    pub memory_clock: Option<f32>,
    pub fan_speed: Option<f32>,
    pub load: Option<f32>,
}

/// A reading plus when we received it. `received_at` drives staleness,
/// `received_unix_ms` is kept for display/debugging.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedReading {
    pub reading: SidecarReading,
    pub received_at: Instant,
    pub received_unix_ms: i64,
}

impl TimedReading {
    pub fn new(reading: SidecarReading, received_at: Instant) -> Self {
        Self {
            reading,
            received_at,
            received_unix_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SidecarLine {
    Reading(SidecarReading),
    /// The sidecar reported a failure in its `error` field.
    Failure(String),
}

/// Parse one stdout line. Blank lines are the caller's business.
pub fn parse_line(line: &str) -> Result<SidecarLine, ProtocolError> {
    let reading: SidecarReading = serde_json::from_str(line.trim())?;
    match reading.error {
        Some(err) => Ok(SidecarLine::Failure(err)),
        None => Ok(SidecarLine::Reading(reading)),
    }
}

/// Whether an `error` message means the sidecar lacks the privileges it needs.
pub fn is_privilege_failure(message: &str) -> bool {
    let m = message.to_lowercase();
    ["admin", "access denied", "permission", "privilege", "elevat", "root"]
        .iter()
        .any(|needle| m.contains(needle))
}
