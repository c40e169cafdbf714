use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response as HttpResponse},
    routing::get,
    Router,
};
use gristdesk_common::protocol::jsonrpc::Response;
use gristdesk_common::types::WindowId;
use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::rpc::methods::{dispatch_bridge_request, parse_raw_request, RpcState};
use crate::window::bridge_host::{BridgeAttachment, BridgeHub};

#[derive(Clone)]
pub struct BridgeState {
    pub hub: BridgeHub,
    pub rpc: RpcState,
}

pub fn router(state: BridgeState) -> Router {
    Router::new().route("/bridge/{window}", get(bridge_ws_route)).with_state(state)
}

pub async fn serve(listener: TcpListener, state: BridgeState) -> Result<()> {
    axum::serve(listener, router(state)).await.context("window bridge server failed")
}

async fn bridge_ws_route(
    ws: WebSocketUpgrade,
    Path(window): Path<u64>,
    State(state): State<BridgeState>,
) -> HttpResponse {
    let window = WindowId(window);
    let Some(attachment) = state.hub.attach(window) else {
        warn!(window = %window, "bridge connection for unknown window");
        return StatusCode::NOT_FOUND.into_response();
    };
    ws.on_upgrade(move |socket| handle_socket(socket, window, attachment, state))
}

async fn handle_socket(mut socket: WebSocket, window: WindowId, attachment: BridgeAttachment, state: BridgeState) {
    debug!(window = %window, "bridge connected");
    let BridgeAttachment { generation, mut pushes } = attachment;

    loop {
        tokio::select! {
            message_result = socket.recv() => {
                let Some(Ok(message)) = message_result else {
                    break;
                };
                let keep_going = match message {
                    WsMessage::Text(payload) => handle_payload(&mut socket, window, payload.as_bytes(), &state).await,
                    WsMessage::Binary(payload) => handle_payload(&mut socket, window, payload.as_ref(), &state).await,
                    WsMessage::Ping(payload) => socket.send(WsMessage::Pong(payload)).await.is_ok(),
                    WsMessage::Pong(_) => true,
                    WsMessage::Close(_) => false,
                };
                if !keep_going {
                    break;
                }
            }
            push = pushes.recv() => {
                let Some(push) = push else {
                    break;
                };
                let Ok(encoded) = serde_json::to_string(&push) else {
                    continue;
                };
                if socket.send(WsMessage::Text(encoded.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.hub.detach(window, generation);
    debug!(window = %window, "bridge disconnected");
}

// Returns whether the socket is still usable.
async fn handle_payload(socket: &mut WebSocket, window: WindowId, raw: &[u8], state: &BridgeState) -> bool {
    let response: Option<Response> = match parse_raw_request(raw) {
        Ok(request) => dispatch_bridge_request(window, request, &state.rpc).await,
        Err(response) => Some(response),
    };
    let Some(response) = response else {
        return true;
    };
    match serde_json::to_string(&response) {
        Ok(encoded) => socket.send(WsMessage::Text(encoded.into())).await.is_ok(),
        Err(_) => false,
    }
}
