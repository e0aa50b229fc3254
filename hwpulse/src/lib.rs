//! hwpulse: periodic hardware telemetry. OS counters from sysinfo are merged with
//! readings from an optional privileged sensor sidecar, and each merged snapshot
//! is published on an in-process bus and streamed over WebSocket.

pub mod bus;
pub mod config;
pub mod error;
pub mod gpu;
pub mod history;
pub mod merge;
pub mod protocol;
pub mod sampler;
pub mod scheduler;
pub mod state;
pub mod supervisor;
pub mod types;
pub mod ws;

pub use bus::{Event, EventBus};
pub use config::Config;
pub use types::{SidecarState, SidecarStatus, Snapshot};
