//! hwpulse_sidecar: prints one JSON sensor reading per line on stdout.
//!
//! Usage: hwpulse_sidecar [--interval MS] [--single]

mod sensors;
mod types;

use std::io::{self, Write};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use sensors::Sensors;
use types::Reading;

const DEFAULT_INTERVAL_MS: u64 = 1000;
const MIN_INTERVAL_MS: u64 = 100;

struct Args {
    interval: Duration,
    single: bool,
}

fn usage(prog: &str) -> String {
    format!("Usage: {prog} [--interval MS] [--single]\n  --interval MS  emit every MS milliseconds (min {MIN_INTERVAL_MS}, default {DEFAULT_INTERVAL_MS})\n  --single       emit one reading and exit")
}

/// Ok(None) means help was requested.
fn parse_args<I: IntoIterator<Item = String>>(args: I) -> anyhow::Result<Option<Args>> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "hwpulse_sidecar".into());
    let mut out = Args {
        interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
        single: false,
    };
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                eprintln!("{}", usage(&prog));
                return Ok(None);
            }
            "--single" => out.single = true,
            "--interval" | "-i" => {
                let v = it.next().context("missing value for --interval")?;
                let ms: u64 = v
                    .parse()
                    .with_context(|| format!("invalid interval '{v}'"))?;
                out.interval = Duration::from_millis(ms.max(MIN_INTERVAL_MS));
            }
            _ => bail!("unexpected argument '{arg}'\n{}", usage(&prog)),
        }
    }
    Ok(Some(out))
}

fn main() -> anyhow::Result<()> {
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let Some(args) = parse_args(std::env::args())? else {
        return Ok(());
    };

    let sys = System::new_with_specifics(RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing()));
    let cpu_name = sys
        .cpus()
        .first()
        .map(|c| c.brand().trim().to_string())
        .unwrap_or_else(|| "Unknown CPU".to_string());
    let mut sensors = Sensors::new();
    info!(interval_ms = args.interval.as_millis() as u64, "sidecar started");

    let stdout = io::stdout();
    loop {
        let started = Instant::now();
        let probes = sensors.probes();
        debug!("{} sensors", probes.len());
        let reading = Reading {
            cpu: sensors::cpu_reading(&probes, &cpu_name),
            gpu: sensors::gpu_readings(&probes),
            timestamp: chrono::Utc::now().timestamp_millis(),
            error: None,
        };

        let line = serde_json::to_string(&reading)?;
        let mut out = stdout.lock();
        if writeln!(out, "{line}").and_then(|_| out.flush()).is_err() {
            // reader went away
            debug!("stdout closed, exiting");
            return Ok(());
        }
        drop(out);

        if args.single {
            return Ok(());
        }
        std::thread::sleep(args.interval.saturating_sub(started.elapsed()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Option<Args>> {
        parse_args(std::iter::once("hwpulse_sidecar").chain(args.iter().copied()).map(String::from))
    }

    #[test]
    fn interval_has_a_floor() {
        let a = parse(&["--interval", "20"]).unwrap().unwrap();
        assert_eq!(a.interval, Duration::from_millis(100));
        let a = parse(&["--interval", "1500", "--single"]).unwrap().unwrap();
        assert_eq!(a.interval, Duration::from_millis(1500));
        assert!(a.single);
    }

    #[test]
    fn bad_args() {
        assert!(parse(&["--interval"]).is_err());
        assert!(parse(&["--interval", "soon"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
        assert!(parse(&["--help"]).unwrap().is_none());
    }
}
