//! WebSocket endpoint for chat clients
//! Handles GET /ws/:openid
//!
//! Each connection registers itself under its identity, then spawns one relay
//! session per inbound chat message. Frames travel back through the registry,
//! so whichever connection is currently registered for the identity receives
//! them. Closing the socket cancels every session it started.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::relay::error::RelayError;
use crate::relay::message::InboundMessage;
use crate::relay::registry::ClientHandle;
use crate::relay::server::AppState;
use crate::relay::session::{RelayContext, RelaySession};

/// Handle GET /ws/:openid
pub async fn handle_ws(
    ws: WebSocketUpgrade,
    Path(identity): Path<String>,
    State(state): State<AppState>,
) -> Response {
    if identity.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, RelayError::MissingIdentity.to_string()).into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, identity, state.relay))
}

async fn handle_socket(socket: WebSocket, identity: String, ctx: RelayContext) {
    let (handle, mut outbound) = ClientHandle::new();
    ctx.registry.register(&identity, handle.clone());
    tracing::info!("Client {} connected ({} online)", identity, ctx.registry.len());

    let connection_cancel = CancellationToken::new();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let mut egress = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut ingest = {
        let ctx = ctx.clone();
        let identity = identity.clone();
        let handle = handle.clone();
        let cancel = connection_cancel.clone();
        tokio::spawn(async move {
            while let Some(message) = ws_receiver.next().await {
                match message {
                    Ok(Message::Text(text)) => dispatch(&ctx, &identity, &handle, &cancel, &text),
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
    };

    tokio::select! {
        _ = &mut ingest => { egress.abort(); }
        _ = &mut egress => { ingest.abort(); }
    }

    connection_cancel.cancel();
    ctx.registry.unregister_handle(&identity, &handle);
    tracing::info!("Client {} disconnected ({} online)", identity, ctx.registry.len());
}

/// Route one inbound text frame. Replies that are not part of a relay
/// session go to the originating socket only.
fn dispatch(
    ctx: &RelayContext,
    identity: &str,
    own: &ClientHandle,
    cancel: &CancellationToken,
    text: &str,
) {
    tracing::debug!("Socket message from {}: {}", identity, text);

    match InboundMessage::parse(text) {
        Ok(InboundMessage::Chat(request)) => {
            RelaySession::new(ctx.clone(), identity, request, cancel.child_token()).spawn();
        }
        Ok(InboundMessage::Other) => {
            own.send_text(chrono::Local::now().to_rfc2822());
        }
        Err(e) => {
            tracing::debug!("Rejected message from {}: {}", identity, e);
            own.send_text(e.to_string());
        }
    }
}
