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
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::PlayerInput;
use crate::lobby::PlayerLink;
use crate::util::rate_limit::InputThrottle;
use crate::util::time::{duration_millis, unix_millis};
use crate::ws::protocol::{ClientMsg, Phase, ServerMsg};

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    info!(connection_id = %connection_id, "New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();

    let greeting = [
        ServerMsg::Welcome {
            connection_id,
            server_time: unix_millis(),
        },
        ServerMsg::Waiting,
        ServerMsg::Phase {
            phase: Phase::Connecting,
            round_number: 0,
        },
    ];
    for msg in &greeting {
        if let Err(e) = send_msg(&mut ws_sink, msg).await {
            error!(connection_id = %connection_id, error = %e, "Failed to send welcome");
            return;
        }
    }

    let link_rx = state.lobby.join(connection_id).await;
    let Some(link) = wait_for_seat(link_rx, &mut ws_stream).await else {
        state.lobby.leave(connection_id).await;
        info!(connection_id = %connection_id, "Connection closed before match start");
        return;
    };

    let rules = &state.config.rules;
    let joined = ServerMsg::MatchJoined {
        match_id: link.match_id,
        slot: link.slot,
        max_health: rules.max_health,
        cards_per_round: rules.cards_per_round,
        round_duration_ms: duration_millis(rules.round_duration),
    };
    if let Err(e) = send_msg(&mut ws_sink, &joined).await {
        warn!(connection_id = %connection_id, error = %e, "Failed to send match join");
    }

    let throttle = InputThrottle::per_second(state.config.input_rate_limit);
    run_session(connection_id, link, throttle, ws_sink, ws_stream).await;

    info!(connection_id = %connection_id, "WebSocket connection closed");
}

/// Wait for an opponent while watching for the client going away
async fn wait_for_seat(
    mut link_rx: oneshot::Receiver<PlayerLink>,
    ws_stream: &mut WsStream,
) -> Option<PlayerLink> {
    loop {
        tokio::select! {
            link = &mut link_rx => return link.ok(),
            frame = ws_stream.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
                Some(Ok(_)) => debug!("Ignoring message while waiting for opponent"),
            },
        }
    }
}

/// Run the WebSocket session with read/write split
async fn run_session(
    connection_id: Uuid,
    link: PlayerLink,
    mut throttle: InputThrottle,
    mut ws_sink: WsSink,
    mut ws_stream: WsStream,
) {
    let PlayerLink {
        match_id,
        slot,
        input_tx,
        mut outbound_rx,
    } = link;

    // Connection-local replies that never pass through the match
    let (direct_tx, mut direct_rx) = mpsc::channel::<ServerMsg>(8);

    // Spawn writer task: match broadcasts -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                Some(msg) = direct_rx.recv() => msg,
                received = outbound_rx.recv() => match received {
                    Ok(envelope) if envelope.is_for(slot) => envelope.msg,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(
                            match_id = %match_id,
                            slot = %slot,
                            lagged_count = n,
                            "Client lagged, skipping {} messages", n
                        );
                        // Continue - phase heartbeats resync the client
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(match_id = %match_id, slot = %slot, "Match channel closed");
                        break;
                    }
                },
            };

            let closing = matches!(msg, ServerMsg::Aborted { .. });
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(match_id = %match_id, slot = %slot, error = %e, "WebSocket send failed");
                break;
            }
            if closing {
                let _ = ws_sink.send(Message::Close(None)).await;
                break;
            }
        }
    });

    // Reader loop: WebSocket -> match loop
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !throttle.admit() {
                    warn!(connection_id = %connection_id, dropped = throttle.dropped(), "Rate limited input message");
                    let _ = direct_tx.try_send(error_msg("rate_limited", "Too many messages"));
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => {
                        let leaving = client_msg == ClientMsg::Leave;
                        if input_tx.send(PlayerInput::new(slot, client_msg)).await.is_err() {
                            debug!(match_id = %match_id, slot = %slot, "Input channel closed");
                            break;
                        }
                        if leaving {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(connection_id = %connection_id, error = %e, "Failed to parse client message");
                        let _ = direct_tx.try_send(error_msg("bad_message", &e.to_string()));
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(connection_id = %connection_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(connection_id = %connection_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Signal disconnect to match loop (no-op if already sent)
    let _ = input_tx.send(PlayerInput::new(slot, ClientMsg::Leave)).await;

    // Abort writer task
    writer_handle.abort();

    if throttle.dropped() > 0 {
        info!(connection_id = %connection_id, dropped = throttle.dropped(), "Session throttled input");
    }
}

fn error_msg(code: &str, message: &str) -> ServerMsg {
    ServerMsg::Error {
        code: code.to_string(),
        message: message.to_string(),
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut WsSink, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
