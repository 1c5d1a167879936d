// WebSocket gateway: upgrades connections, parses the message envelope and
// routes commands to the connection's room session.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast;

use owo_colors::OwoColorize;

use crate::protocol::{decode_client_msg, ClientMsg, Decoded, ErrorKind, ServerMsg};
use crate::server::session::{CommandError, RoomSession};
use crate::server::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    // A connection is unbound until a JOIN names a room.
    let Some((session, rx)) = join_phase(&mut socket, &state).await else {
        return;
    };

    room_phase(&mut socket, &session, rx).await;

    state.registry.release(&session).await;
    tracing::info!(room = %session.slug, "client disconnected");
}

/// Wait for a JOIN and resolve it. Returns `None` when the transport goes
/// away or the join fails hard (unknown room, store failure during load).
async fn join_phase(
    socket: &mut WebSocket,
    state: &AppState,
) -> Option<(Arc<RoomSession>, broadcast::Receiver<ServerMsg>)> {
    loop {
        let txt = match socket.next().await {
            Some(Ok(Message::Text(txt))) => txt,
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
            Some(Ok(_)) => continue,
        };
        match decode_client_msg(&txt) {
            Decoded::Msg(ClientMsg::Join { room_id }) => {
                match state.registry.attach(&room_id).await {
                    Ok(Some((session, users))) => {
                        let hello = format!("{} {}", "[JOIN]".bold().green(), session.slug.bold());
                        tracing::info!(%hello);
                        let rx = session.broadcaster.subscribe();
                        send_ws(socket, &ServerMsg::RoomState(users)).await;
                        return Some((session, rx));
                    }
                    Ok(None) => {
                        tracing::warn!(room = %room_id, "join attempt for non-existent room");
                        send_ws(socket, &CommandError::RoomNotFound.to_msg()).await;
                        return None;
                    }
                    Err(e) => {
                        tracing::error!(room = %room_id, error = %e, "store failure while loading room");
                        send_ws(socket, &CommandError::Store(e).to_msg()).await;
                        return None;
                    }
                }
            }
            Decoded::Msg(_) => {
                let msg = ServerMsg::error(ErrorKind::Validation, "Not joined to a room");
                send_ws(socket, &msg).await;
            }
            Decoded::Unknown(kind) => {
                tracing::warn!(msg_type = %kind, "ignoring unknown message type");
            }
            Decoded::Malformed => {
                tracing::warn!(raw_in = %txt, "failed to parse incoming message");
                let msg = ServerMsg::error(ErrorKind::Protocol, "Malformed message JSON");
                send_ws(socket, &msg).await;
            }
        }
    }
}

/// Joined steady state: relay the room's broadcast stream and apply inbound
/// commands until the transport closes.
async fn room_phase(
    socket: &mut WebSocket,
    session: &Arc<RoomSession>,
    mut rx: broadcast::Receiver<ServerMsg>,
) {
    loop {
        tokio::select! {
            biased;

            broadcasted = rx.recv() => {
                match broadcasted {
                    Ok(sm) => send_ws(socket, &sm).await,
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        // We missed messages; the next ROOM_STATE catches us up.
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            msg = socket.next() => {
                match msg {
                    Some(Ok(Message::Text(txt))) => match decode_client_msg(&txt) {
                        Decoded::Msg(ClientMsg::Join { .. }) => {
                            let msg = ServerMsg::error(ErrorKind::Validation, "Already joined to a room");
                            send_ws(socket, &msg).await;
                        }
                        Decoded::Msg(cm) => {
                            if let Err(e) = session.handle_command(cm).await {
                                if let CommandError::Store(source) = &e {
                                    tracing::error!(room = %session.slug, error = %source, "store write failed");
                                }
                                send_ws(socket, &e.to_msg()).await;
                            }
                        }
                        Decoded::Unknown(kind) => {
                            tracing::warn!(msg_type = %kind, "ignoring unknown message type");
                        }
                        Decoded::Malformed => {
                            tracing::warn!(raw_in = %txt, "failed to parse incoming message");
                            let msg = ServerMsg::error(ErrorKind::Protocol, "Malformed message JSON");
                            send_ws(socket, &msg).await;
                        }
                    },
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }
}

async fn send_ws(socket: &mut WebSocket, msg: &ServerMsg) {
    match serde_json::to_string(msg) {
        Ok(txt) => {
            let _ = socket.send(Message::Text(txt)).await;
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize ServerMsg for websocket send");
        }
    }
}
