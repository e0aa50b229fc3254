//! Runtime configuration: defaults, then `HWPULSE_*` environment variables, then
//! command-line flags.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::scheduler::{clamp_interval, DEFAULT_INTERVAL};
use crate::supervisor::{SidecarBinary, SidecarConfig};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_TOP_PROCESSES: usize = 8;
pub const DEFAULT_HISTORY: usize = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub interval: Duration,
    pub bind: IpAddr,
    pub port: u16,
    /// None disables the sidecar entirely.
    pub sidecar: Option<SidecarBinary>,
    pub top_processes: usize,
    pub history_len: usize,
    pub auth_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            sidecar: Some(SidecarBinary::Auto),
            top_processes: DEFAULT_TOP_PROCESSES,
            history_len: DEFAULT_HISTORY,
            auth_token: None,
        }
    }
}

pub fn usage(prog: &str) -> String {
    format!(
        "Usage: {prog} [--interval MS|-i MS] [--port PORT|-p PORT] [--sidecar PATH] [--no-sidecar] [--top N] [--history N]\n\
         Env: HWPULSE_INTERVAL_MS HWPULSE_BIND HWPULSE_PORT HWPULSE_SIDECAR (path, or 0 to disable) HWPULSE_TOP HWPULSE_HISTORY HWPULSE_TOKEN HWPULSE_GPU"
    )
}

impl Config {
    pub fn from_env_and_args() -> Result<Self, String> {
        Self::from_sources(std::env::args(), |k| std::env::var(k).ok())
    }

    /// Err carries the text to print: usage for `--help`, or what was wrong.
    pub fn from_sources<I, F>(args: I, env: F) -> Result<Self, String>
    where
        I: IntoIterator<Item = String>,
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();

        if let Some(ms) = env("HWPULSE_INTERVAL_MS").and_then(|v| v.parse::<u64>().ok()) {
            cfg.interval = Duration::from_millis(ms);
        }
        if let Some(ip) = env("HWPULSE_BIND").and_then(|v| v.parse().ok()) {
            cfg.bind = ip;
        }
        if let Some(p) = env("HWPULSE_PORT").and_then(|v| v.parse().ok()) {
            cfg.port = p;
        }
        match env("HWPULSE_SIDECAR") {
            Some(v) if v == "0" => cfg.sidecar = None,
            Some(v) if !v.is_empty() => cfg.sidecar = Some(SidecarBinary::Path(PathBuf::from(v))),
            _ => {}
        }
        if let Some(n) = env("HWPULSE_TOP").and_then(|v| v.parse().ok()) {
            cfg.top_processes = n;
        }
        if let Some(n) = env("HWPULSE_HISTORY").and_then(|v| v.parse().ok()) {
            cfg.history_len = n;
        }
        cfg.auth_token = env("HWPULSE_TOKEN").filter(|t| !t.is_empty());

        let mut it = args.into_iter();
        let prog = it.next().unwrap_or_else(|| "hwpulse".into());
        while let Some(arg) = it.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
                _ => (arg.clone(), None),
            };
            let mut value = |name: &str| -> Result<String, String> {
                inline
                    .clone()
                    .or_else(|| it.next())
                    .ok_or_else(|| format!("missing value for {name}\n{}", usage(&prog)))
            };
            match flag.as_str() {
                "-h" | "--help" => return Err(usage(&prog)),
                "--interval" | "-i" => {
                    let v = value("--interval")?;
                    let ms: u64 = v
                        .parse()
                        .map_err(|_| format!("invalid interval '{v}' (milliseconds)"))?;
                    cfg.interval = Duration::from_millis(ms);
                }
                "--port" | "-p" => {
                    let v = value("--port")?;
                    cfg.port = v.parse().map_err(|_| format!("invalid port '{v}'"))?;
                }
                "--sidecar" => cfg.sidecar = Some(SidecarBinary::Path(PathBuf::from(value("--sidecar")?))),
                "--no-sidecar" => cfg.sidecar = None,
                "--top" => {
                    let v = value("--top")?;
                    cfg.top_processes = v.parse().map_err(|_| format!("invalid --top '{v}'"))?;
                }
                "--history" => {
                    let v = value("--history")?;
                    cfg.history_len = v.parse().map_err(|_| format!("invalid --history '{v}'"))?;
                }
                _ => return Err(format!("Unexpected argument '{arg}'. {}", usage(&prog))),
            }
        }

        cfg.interval = clamp_interval(cfg.interval);
        Ok(cfg)
    }

    pub fn sidecar_config(&self) -> Option<SidecarConfig> {
        self.sidecar
            .clone()
            .map(|binary| SidecarConfig::new(binary, self.interval))
    }
}
