//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::world::Session;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::ws::channel::ClientChannel;
use crate::ws::protocol::{ClientRequest, RequestFrame, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    debug!(conn_id = %conn_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();

    let (client, outbound_rx) = ClientChannel::new(state.config.game.outbound_buffer);
    let Some(session) = state.world.connect(client).await else {
        error!(conn_id = %conn_id, "World is not running, dropping connection");
        return;
    };
    let player_id = session.player_id;
    info!(conn_id = %conn_id, player_id, "Player connected");

    run_session(conn_id, session, &state, ws_sink, ws_stream, outbound_rx).await;

    // Cleanup on disconnect
    state.world.disconnect(session).await;

    info!(conn_id = %conn_id, player_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    conn_id: Uuid,
    session: Session,
    state: &AppState,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut outbound_rx: mpsc::Receiver<ServerMsg>,
) {
    let rate_limiter = PlayerRateLimiter::new(state.config.game.input_rate_limit);

    // Writer task: world frames -> WebSocket. Ends when the world drops the
    // player's channel (death or disconnect).
    let mut writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(conn_id = %conn_id, error = %e, "WebSocket send failed");
                return;
            }
        }
        debug!(conn_id = %conn_id, "Outbound channel closed");
        let _ = ws_sink.send(Message::Close(None)).await;
    });

    // Reader loop: WebSocket -> world
    loop {
        let frame = tokio::select! {
            _ = &mut writer => break,
            frame = ws_stream.next() => frame,
        };
        let Some(result) = frame else {
            break;
        };

        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(conn_id = %conn_id, player_id = session.player_id, "Rate limited input message");
                    continue;
                }

                let frame = match serde_json::from_str::<RequestFrame>(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        debug!(conn_id = %conn_id, error = %e, "Failed to parse client frame");
                        continue;
                    }
                };
                let Some(request) = ClientRequest::from_frame(&frame) else {
                    debug!(conn_id = %conn_id, url = %frame.url, "Ignoring unknown request");
                    continue;
                };

                if !state.world.request(session, frame.request, request).await {
                    debug!(conn_id = %conn_id, "World command channel closed");
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                debug!(conn_id = %conn_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!(conn_id = %conn_id, "Client initiated close");
                break;
            }
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer.abort();
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
