//! Sensor sidecar supervision: locate and spawn the helper, read its stdout line
//! by line, watch liveness, restart within a fixed budget, classify failures.
//!
//! The supervisor task is the only writer of the sidecar status and of the
//! latest-reading cell. Status changes go out on the bus as they happen, not on
//! the sampler's clock.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant, SystemTime};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, timeout_at};
use tracing::{debug, info, warn};

use crate::bus::EventBus;
use crate::error::SpawnError;
use crate::protocol::{is_privilege_failure, parse_line, SidecarLine, SidecarReading, TimedReading};
use crate::types::{SidecarState, SidecarStatus};

pub const MAX_RESTARTS: u32 = 3;
pub const RESTART_DELAY: Duration = Duration::from_secs(2);
const LIVENESS_FLOOR: Duration = Duration::from_secs(3);
pub const STABLE_AFTER: Duration = Duration::from_secs(60);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

#[cfg(windows)]
pub const SIDECAR_BINARY: &str = "hwpulse_sidecar.exe";
#[cfg(not(windows))]
pub const SIDECAR_BINARY: &str = "hwpulse_sidecar";

#[derive(Debug, Clone, PartialEq)]
pub enum SidecarBinary {
    /// Search next to the running executable, then in `binaries/`.
    Auto,
    Path(PathBuf),
}

#[derive(Debug, Clone)]
pub struct SidecarConfig {
    pub binary: SidecarBinary,
    /// Leading arguments, placed before `--interval`.
    pub args: Vec<String>,
    pub interval: Duration,
    pub restart_delay: Duration,
    pub max_restarts: u32,
    /// Running this long after a restart clears the consecutive-restart count.
    pub stable_after: Duration,
}

impl SidecarConfig {
    pub fn new(binary: SidecarBinary, interval: Duration) -> Self {
        Self {
            binary,
            args: Vec::new(),
            interval,
            restart_delay: RESTART_DELAY,
            max_restarts: MAX_RESTARTS,
            stable_after: STABLE_AFTER,
        }
    }

    /// interval × 3, never under 3s.
    pub fn liveness_timeout(&self) -> Duration {
        (self.interval * 3).max(LIVENESS_FLOOR)
    }
}

pub fn resolve_binary(binary: &SidecarBinary) -> Result<PathBuf, SpawnError> {
    if let SidecarBinary::Path(p) = binary {
        return Ok(p.clone());
    }
    let mut searched = Vec::new();
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        searched.push(dir.join(SIDECAR_BINARY));
        searched.push(dir.join("binaries").join(SIDECAR_BINARY));
    }
    if let Ok(cwd) = std::env::current_dir() {
        searched.push(cwd.join("binaries").join(SIDECAR_BINARY));
    }
    for candidate in &searched {
        debug!("checking sidecar path {}", candidate.display());
        if candidate.is_file() {
            return Ok(candidate.clone());
        }
    }
    Err(SpawnError::NotFound { searched })
}

/// Owner-side handle: read the latest reading, stop the supervisor.
pub struct SidecarHandle {
    latest: watch::Receiver<Option<TimedReading>>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SidecarHandle {
    /// Most recent non-error reading and when it arrived, or None if none yet.
    pub fn latest_reading(&self) -> Option<TimedReading> {
        self.latest.borrow().clone()
    }

    /// Signal the supervisor, then wait until the child is killed and reaped.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!("sidecar supervisor ended abnormally: {e}");
        }
    }
}

pub fn spawn_supervisor(config: SidecarConfig, bus: EventBus) -> SidecarHandle {
    let (latest_tx, latest_rx) = watch::channel(None);
    let (stop_tx, stop_rx) = watch::channel(false);
    let sup = Supervisor {
        config,
        bus,
        latest: latest_tx,
        stop: stop_rx,
        state: SidecarState::NotStarted,
        restart_count: 0,
        running_since: None,
    };
    SidecarHandle {
        latest: latest_rx,
        stop: stop_tx,
        task: tokio::spawn(sup.run()),
    }
}

/// Why a sidecar instance stopped being watched.
#[derive(Debug)]
enum Exit {
    Shutdown,
    Stopped(String),
    Failed(String),
    NeedsAdmin(String),
}

struct Supervisor {
    config: SidecarConfig,
    bus: EventBus,
    latest: watch::Sender<Option<TimedReading>>,
    stop: watch::Receiver<bool>,
    state: SidecarState,
    restart_count: u32,
    running_since: Option<Instant>,
}

impl Supervisor {
    async fn run(mut self) {
        let program = match resolve_binary(&self.config.binary) {
            Ok(p) => p,
            Err(e) => {
                warn!("{e}");
                self.transition(SidecarState::BinaryNotFound, Some(e.to_string()));
                return;
            }
        };

        loop {
            let exit = match self.spawn(&program) {
                Ok(child) => {
                    info!("sidecar started: {}", program.display());
                    self.transition(SidecarState::Starting, None);
                    self.watch(child).await
                }
                Err(e @ (SpawnError::NotFound { .. } | SpawnError::Missing { .. })) => {
                    warn!("{e}");
                    self.transition(SidecarState::BinaryNotFound, Some(e.to_string()));
                    return;
                }
                Err(e @ SpawnError::ElevationRequired { .. }) => Exit::NeedsAdmin(e.to_string()),
                Err(e) => Exit::Failed(e.to_string()),
            };

            match exit {
                Exit::Shutdown => return self.shut_down(),
                Exit::NeedsAdmin(msg) => {
                    warn!("sidecar needs elevated privileges: {msg}");
                    self.transition(SidecarState::RequiresAdmin, Some(msg));
                    return;
                }
                Exit::Stopped(msg) => {
                    warn!("sidecar stopped: {msg}");
                    self.transition(SidecarState::Stopped, Some(msg));
                }
                Exit::Failed(msg) => {
                    warn!("sidecar error: {msg}");
                    self.transition(SidecarState::Error, Some(msg));
                }
            }

            if self.restart_count >= self.config.max_restarts {
                warn!(
                    "sidecar failed {} consecutive restarts, giving up",
                    self.restart_count
                );
                wait_stop(&mut self.stop).await;
                return self.shut_down();
            }

            let stopped = tokio::select! {
                _ = sleep(self.config.restart_delay) => false,
                _ = wait_stop(&mut self.stop) => true,
            };
            if stopped {
                return self.shut_down();
            }
            self.restart_count += 1;
            info!(
                "restarting sidecar (attempt {}/{})",
                self.restart_count, self.config.max_restarts
            );
        }
    }

    fn spawn(&self, program: &Path) -> Result<Child, SpawnError> {
        let mut cmd = Command::new(program);
        cmd.args(&self.config.args)
            .arg("--interval")
            .arg(self.config.interval.as_millis().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);
        cmd.spawn()
            .map_err(|e| SpawnError::from_io(program.to_path_buf(), e))
    }

    async fn watch(&mut self, mut child: Child) -> Exit {
        let Some(stdout) = child.stdout.take() else {
            terminate(&mut child).await;
            return Exit::Failed(SpawnError::NoStdout.to_string());
        };
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        let mut lines = BufReader::new(stdout).lines();
        let window = self.config.liveness_timeout();
        let mut last_line = Heartbeat::now();
        let mut grace_used = false;

        let exit = loop {
            // Measured from the last real line; blank lines do not extend it.
            let deadline = tokio::time::Instant::from_std(last_line.mono + window);
            let next = tokio::select! {
                _ = wait_stop(&mut self.stop) => None,
                r = timeout_at(deadline, lines.next_line()) => Some(r),
            };
            let Some(res) = next else {
                break Exit::Shutdown;
            };
            match res {
                Err(_) => {
                    if !grace_used && last_line.slept_through(window) {
                        info!("system resumed from sleep; extending sidecar liveness window");
                        grace_used = true;
                        last_line = Heartbeat::now();
                        continue;
                    }
                    break Exit::Stopped(format!(
                        "no output for {}s",
                        window.as_secs_f32()
                    ));
                }
                Ok(Ok(Some(line))) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    last_line = Heartbeat::now();
                    grace_used = false;
                    match parse_line(&line) {
                        Ok(SidecarLine::Reading(r)) => self.on_reading(r),
                        Ok(SidecarLine::Failure(msg)) if is_privilege_failure(&msg) => {
                            break Exit::NeedsAdmin(msg)
                        }
                        Ok(SidecarLine::Failure(msg)) => break Exit::Failed(msg),
                        Err(e) => {
                            debug!("discarding sidecar line: {line}");
                            break Exit::Failed(e.to_string());
                        }
                    }
                }
                Ok(Ok(None)) => break Exit::Stopped(exit_description(&mut child).await),
                Ok(Err(e)) => break Exit::Stopped(format!("reading sidecar output failed: {e}")),
            }
        };

        terminate(&mut child).await;
        exit
    }

    fn on_reading(&mut self, reading: SidecarReading) {
        let now = Instant::now();
        self.latest
            .send_replace(Some(TimedReading::new(reading, now)));

        if self.state == SidecarState::Running {
            let stable = self
                .running_since
                .is_some_and(|t| now.duration_since(t) >= self.config.stable_after);
            if stable && self.restart_count > 0 {
                info!("sidecar stable again; restart budget reset");
                self.restart_count = 0;
                self.transition(SidecarState::Running, None);
            }
        } else {
            if self.restart_count == 0 {
                info!("sidecar receiving data");
            } else {
                info!("sidecar recovered after {} restart(s)", self.restart_count);
            }
            self.running_since = Some(now);
            self.transition(SidecarState::Running, None);
        }
    }

    fn shut_down(&mut self) {
        self.transition_with(SidecarState::Stopped, Some("shut down".into()), false);
    }

    fn transition(&mut self, state: SidecarState, message: Option<String>) {
        let can_restart = !state.is_terminal() && self.restart_count < self.config.max_restarts;
        self.transition_with(state, message, can_restart);
    }

    fn transition_with(&mut self, state: SidecarState, message: Option<String>, can_restart: bool) {
        self.state = state;
        if state != SidecarState::Running {
            self.running_since = None;
        }
        self.bus.publish_status(SidecarStatus {
            state,
            message,
            restart_count: self.restart_count,
            can_restart,
        });
    }
}

/// Wall and monotonic time of the last line. If the wall clock ran ahead of the
/// monotonic one by more than a liveness window, the machine was asleep.
struct Heartbeat {
    mono: Instant,
    wall: SystemTime,
}

impl Heartbeat {
    fn now() -> Self {
        Self {
            mono: Instant::now(),
            wall: SystemTime::now(),
        }
    }

    fn slept_through(&self, window: Duration) -> bool {
        let wall = self.wall.elapsed().unwrap_or_default();
        wall.saturating_sub(self.mono.elapsed()) > window
    }
}

// Resolves when stop is signalled or the handle is gone.
pub(crate) async fn wait_stop(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|s| *s).await;
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!("sidecar kill: {e}");
    }
    match timeout(Duration::from_secs(2), child.wait()).await {
        Ok(Ok(status)) => debug!("sidecar reaped: {status}"),
        Ok(Err(e)) => warn!("waiting for sidecar failed: {e}"),
        Err(_) => warn!("sidecar did not exit after kill"),
    }
}

async fn exit_description(child: &mut Child) -> String {
    match timeout(Duration::from_millis(500), child.wait()).await {
        Ok(Ok(status)) => format!("sidecar exited ({status})"),
        _ => "sidecar closed its output".to_string(),
    }
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "hwpulse::sidecar", "{line}");
    }
}
