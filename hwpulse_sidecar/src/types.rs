//! Wire types written to stdout, one `Reading` per line.

use serde::Serialize;

#[derive(Debug, Default, Serialize, Clone, PartialEq)]
pub struct Reading {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuReading>,
    pub gpu: Vec<GpuReading>,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, Clone, PartialEq)]
pub struct CpuReading {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub core_temperatures: Vec<Option<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_temperature: Option<f32>,
}

#[derive(Debug, Default, Serialize, Clone, PartialEq)]
pub struct GpuReading {
    pub name: String,
    pub vendor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hot_spot_temperature: Option<f32>,
}
