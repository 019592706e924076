//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::room::{RoomError, RoomRegistry};
use crate::util::rate_limit::SessionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, Outbound, ServerMsg};

const MAX_NAME_LEN: usize = 24;

/// Query parameters for WebSocket connection
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Display name; a generated one is used when missing
    #[serde(default)]
    pub name: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let session_id = Uuid::new_v4();
    let name = display_name(query.name.as_deref(), session_id);
    info!(session_id = %session_id, name = %name, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, name, state))
}

/// Trimmed, capped name or `Player_xxxxxxxx`
fn display_name(requested: Option<&str>, session_id: Uuid) -> String {
    let trimmed: String = requested
        .unwrap_or_default()
        .trim()
        .chars()
        .take(MAX_NAME_LEN)
        .collect();
    if trimmed.is_empty() {
        format!("Player_{}", &session_id.simple().to_string()[..8])
    } else {
        trimmed
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, session_id: Uuid, name: String, state: AppState) {
    info!(session_id = %session_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        player_id: session_id,
        name: name.clone(),
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &Outbound::from(welcome)).await {
        error!(session_id = %session_id, error = %e, "Failed to send welcome");
        return;
    }

    let outbound_rx = state.rooms.register_session(session_id, name);
    state.rooms.send_to(
        &session_id,
        ServerMsg::RoomList {
            rooms: state.rooms.list_rooms(),
        },
    );

    run_session(session_id, ws_sink, ws_stream, outbound_rx, &state.rooms).await;

    // Leaving the room here also forfeits a running match if a side empties
    state.rooms.unregister_session(session_id);

    info!(session_id = %session_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    session_id: Uuid,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    rooms: &RoomRegistry,
) {
    let rate_limiter = SessionRateLimiter::new();

    // Writer task: session channel -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(session_id = %session_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> room registry
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMsg>(&text) {
                Ok(msg) => {
                    let allowed = if msg.is_input() {
                        rate_limiter.check_input()
                    } else {
                        rate_limiter.check_command()
                    };
                    if !allowed {
                        warn!(session_id = %session_id, "Rate limited client message");
                        continue;
                    }
                    dispatch(rooms, session_id, msg);
                }
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Failed to parse client message");
                }
            },
            Ok(Message::Binary(_)) => {
                warn!(session_id = %session_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(session_id = %session_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Route one client message; errors go back to the sender only
fn dispatch(rooms: &RoomRegistry, session_id: Uuid, msg: ClientMsg) {
    let outcome: Result<(), RoomError> = match msg {
        ClientMsg::Login { username } => {
            rooms.rename(session_id, display_name(Some(&username), session_id));
            Ok(())
        }
        ClientMsg::CreateRoom {
            name,
            max_players,
            password,
        } => rooms
            .create_room(session_id, name, max_players, password)
            .map(|_| ()),
        ClientMsg::JoinRoom { room_id, password } => rooms
            .join_room(session_id, room_id, password.as_deref())
            .map(|_| ()),
        ClientMsg::LeaveRoom => {
            rooms.leave_room(session_id);
            Ok(())
        }
        ClientMsg::GetRooms => {
            rooms.send_to(
                &session_id,
                ServerMsg::RoomList {
                    rooms: rooms.list_rooms(),
                },
            );
            Ok(())
        }
        ClientMsg::JoinTeam { player_id, team } => rooms.join_team(session_id, player_id, team),
        ClientMsg::KickPlayer { player_id } => rooms.kick(session_id, player_id),
        ClientMsg::SetTeamColors { team, colors } => {
            rooms.set_team_colors(session_id, team, colors)
        }
        ClientMsg::SetMatchDuration { duration } => rooms.set_match_duration(session_id, duration),
        ClientMsg::AddBot => rooms.add_bot(session_id),
        ClientMsg::RemoveBot { bot_id } => rooms.remove_bot(session_id, bot_id),
        ClientMsg::StartMatch => rooms.start_match(session_id),
        ClientMsg::StopMatch => rooms.stop_match(session_id),
        ClientMsg::Input { input } => {
            rooms.apply_input(session_id, input);
            Ok(())
        }
        ClientMsg::Chat { text } => rooms.chat(session_id, &text),
        ClientMsg::Ping { t } => {
            rooms.send_to(&session_id, ServerMsg::Pong { t });
            Ok(())
        }
    };

    if let Err(e) = outcome {
        debug!(session_id = %session_id, error = %e, "Room command rejected");
        rooms.send_to(&session_id, ServerMsg::from(&e));
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &Outbound,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::RoomSettings;

    #[test]
    fn display_name_is_trimmed_or_generated() {
        let id = Uuid::new_v4();
        assert_eq!(display_name(Some("  Zico "), id), "Zico");
        assert_eq!(display_name(Some(&"n".repeat(40)), id).len(), MAX_NAME_LEN);

        let generated = display_name(None, id);
        assert!(generated.starts_with("Player_"));
        assert_eq!(generated.len(), "Player_".len() + 8);
        assert_eq!(display_name(Some("   "), id), generated);
    }

    #[tokio::test]
    async fn rejected_commands_reply_with_error() {
        let rooms = RoomRegistry::new(RoomSettings::default());
        let id = Uuid::new_v4();
        let mut rx = rooms.register_session(id, "ana".to_string());

        dispatch(&rooms, id, ClientMsg::StartMatch);
        match rx.recv().await {
            Some(Outbound::Server(ServerMsg::Error { code, .. })) => assert_eq!(code, "not_in_room"),
            other => panic!("expected error, got {other:?}"),
        }

        dispatch(&rooms, id, ClientMsg::Ping { t: 7 });
        assert!(matches!(
            rx.recv().await,
            Some(Outbound::Server(ServerMsg::Pong { t: 7 }))
        ));
    }

    #[tokio::test]
    async fn login_renames_before_room_creation() {
        let rooms = RoomRegistry::new(RoomSettings::default());
        let id = Uuid::new_v4();
        let _rx = rooms.register_session(id, "Player_1".to_string());

        dispatch(
            &rooms,
            id,
            ClientMsg::Login {
                username: "Hagi".to_string(),
            },
        );
        dispatch(
            &rooms,
            id,
            ClientMsg::CreateRoom {
                name: None,
                max_players: None,
                password: None,
            },
        );

        let summary = &rooms.list_rooms()[0];
        assert_eq!(summary.name, "Hagi's room");
        assert_eq!(summary.player_count, 1);
    }
}
