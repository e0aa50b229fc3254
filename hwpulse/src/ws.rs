//! WebSocket upgrade and per-connection handler. Pushes every bus event to the
//! client and answers the few pull requests a dashboard needs.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::bus::Event;
use crate::state::AppState;

use std::collections::HashMap;
use std::sync::atomic::Ordering;

type WsSender = SplitSink<WebSocket, Message>;

#[derive(Serialize)]
struct Reply<'a, T: Serialize> {
    event: &'a str,
    payload: T,
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    if let Some(expected) = state.auth_token.as_ref() {
        match q.get("token") {
            Some(t) if t == expected => {}
            _ => return StatusCode::UNAUTHORIZED.into_response(),
        }
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let clients = state.client_count.fetch_add(1, Ordering::Relaxed) + 1;
    debug!("client connected ({clients} connected)");

    // Ensure we decrement on disconnect (drop).
    struct ClientGuard(AppState);
    impl Drop for ClientGuard {
        fn drop(&mut self) {
            self.0.client_count.fetch_sub(1, Ordering::Relaxed);
        }
    }
    let _guard = ClientGuard(state.clone());

    let mut events = state.bus.subscribe();
    let (mut sender, mut receiver) = socket.split();

    // Status only goes out on transitions; a late client gets the current one up front.
    let hello = Event::SidecarStatus(state.bus.sidecar_status());
    if send_json(&mut sender, &hello).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = answer(&state, text.trim()) {
                        if sender.send(Message::Text(reply)).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            ev = events.recv() => match ev {
                Ok(ev) => {
                    if send_json(&mut sender, &ev).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => debug!("slow client skipped {n} events"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    debug!("client disconnected");
}

fn answer(state: &AppState, request: &str) -> Option<String> {
    let js = match request {
        "get_system_stats" => serde_json::to_string(&Reply {
            event: "system-stats",
            payload: state.bus.get_system_stats(),
        }),
        "get_sidecar_status" => {
            serde_json::to_string(&Event::SidecarStatus(state.bus.sidecar_status()))
        }
        "has_gpu_support" => serde_json::to_string(&Reply {
            event: "gpu-support",
            payload: has_gpu_support(state),
        }),
        "get_history" => serde_json::to_string(&Reply {
            event: "history",
            payload: state.bus.history(),
        }),
        _ => return None,
    };
    match js {
        Ok(s) => Some(s),
        Err(e) => {
            warn!("serializing reply to {request} failed: {e}");
            None
        }
    }
}

// False until the first snapshot is out.
fn has_gpu_support(state: &AppState) -> bool {
    state
        .bus
        .get_system_stats()
        .is_some_and(|s| s.system_info.gpu_name.is_some())
}

async fn send_json(sender: &mut WsSender, event: &Event) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(js) => sender.send(Message::Text(js)).await,
        Err(e) => {
            warn!("serializing event failed: {e}");
            Ok(())
        }
    }
}
