//! hwpulse agent binary.

use std::net::SocketAddr;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hwpulse::bus::EventBus;
use hwpulse::config::Config;
use hwpulse::sampler::SystemSampler;
use hwpulse::scheduler::spawn_scheduler;
use hwpulse::state::AppState;
use hwpulse::supervisor::spawn_supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = match Config::from_env_and_args() {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let bus = EventBus::new(cfg.history_len);
    let sidecar = cfg
        .sidecar_config()
        .map(|sc| spawn_supervisor(sc, bus.clone()));
    if sidecar.is_none() {
        info!("sensor sidecar disabled");
    }

    let sampler = tokio::task::spawn_blocking(SystemSampler::new)
        .await
        .context("initialising system sampler")?;
    let scheduler = spawn_scheduler(
        sampler,
        cfg.interval,
        cfg.top_processes,
        bus.clone(),
        sidecar,
    );

    let app = hwpulse::ws::router(AppState::new(bus, cfg.auth_token.clone()));
    let addr = SocketAddr::new(cfg.bind, cfg.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("hwpulse listening on ws://{addr}/ws");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await;

    // Reap the sidecar even if the server failed.
    scheduler.shutdown().await;
    served.context("serving websocket")?;
    Ok(())
}
