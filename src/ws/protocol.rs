//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::{EntityId, InputState, MatchEvent, Side};
use crate::room::{RoomError, RoomSummary, RoomView, Seat, TeamColors};

/// Longest chat line relayed to a room
pub const MAX_CHAT_LEN: usize = 200;

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMsg {
    /// Set the display name
    Login { username: String },

    #[serde(rename_all = "camelCase")]
    CreateRoom {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        max_players: Option<usize>,
        #[serde(default)]
        password: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: Uuid,
        #[serde(default)]
        password: Option<String>,
    },

    LeaveRoom,

    GetRooms,

    /// Move a member to a team or the bench; defaults to the sender
    #[serde(rename_all = "camelCase")]
    JoinTeam {
        #[serde(default)]
        player_id: Option<EntityId>,
        team: Seat,
    },

    #[serde(rename_all = "camelCase")]
    KickPlayer { player_id: EntityId },

    SetTeamColors {
        team: Side,
        #[serde(default)]
        colors: TeamColors,
    },

    SetMatchDuration { duration: u32 },

    AddBot,

    #[serde(rename_all = "camelCase")]
    RemoveBot { bot_id: EntityId },

    StartMatch,

    StopMatch,

    /// Held controls; replaces the previous state
    Input {
        #[serde(default)]
        input: InputState,
    },

    Chat { text: String },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

impl ClientMsg {
    pub fn is_input(&self) -> bool {
        matches!(self, ClientMsg::Input { .. })
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Welcome message after connection
    #[serde(rename_all = "camelCase")]
    Welcome {
        player_id: EntityId,
        name: String,
        server_time: u64,
    },

    RoomList { rooms: Vec<RoomSummary> },

    /// Sent to a session that created or joined a room
    RoomJoined { room: RoomView },

    RoomUpdate { room: RoomView },

    LeftRoom,

    #[serde(rename_all = "camelCase")]
    NewOwner { owner_id: EntityId },

    Kicked,

    MatchStarting,

    #[serde(rename_all = "camelCase")]
    Chat {
        player_id: EntityId,
        username: String,
        text: String,
    },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

impl From<&RoomError> for ServerMsg {
    fn from(e: &RoomError) -> Self {
        ServerMsg::Error {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

/// Anything written to a client socket
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    Server(ServerMsg),
    Match(MatchEvent),
}

impl From<ServerMsg> for Outbound {
    fn from(msg: ServerMsg) -> Self {
        Outbound::Server(msg)
    }
}

impl From<MatchEvent> for Outbound {
    fn from(event: MatchEvent) -> Self {
        Outbound::Match(event)
    }
}

/// Trim a chat line to `MAX_CHAT_LEN` characters
pub fn clamp_chat(text: &str) -> String {
    text.trim().chars().take(MAX_CHAT_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_room_commands() {
        let msg: ClientMsg = serde_json::from_value(json!({
            "type": "joinTeam",
            "team": "spectator"
        }))
        .unwrap();
        assert!(matches!(
            msg,
            ClientMsg::JoinTeam {
                player_id: None,
                team: Seat::Spectator
            }
        ));

        let msg: ClientMsg = serde_json::from_value(json!({
            "type": "setTeamColors",
            "team": "right",
            "colors": { "jersey": "#111111" }
        }))
        .unwrap();
        match msg {
            ClientMsg::SetTeamColors { team, colors } => {
                assert_eq!(team, Side::Right);
                assert_eq!(colors.jersey.as_deref(), Some("#111111"));
                assert!(colors.name.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_nested_input() {
        let msg: ClientMsg = serde_json::from_value(json!({
            "type": "input",
            "input": { "up": true, "shoot": true, "aimX": 300.0, "aimY": 120.5 }
        }))
        .unwrap();
        assert!(msg.is_input());
        match msg {
            ClientMsg::Input { input } => {
                assert!(input.up && input.shoot && !input.down);
                assert_eq!(input.aim(), Some((300.0, 120.5)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_value::<ClientMsg>(json!({ "type": "teleport" })).is_err());
    }

    #[test]
    fn server_messages_are_tagged() {
        let value = serde_json::to_value(Outbound::from(ServerMsg::NewOwner {
            owner_id: Uuid::nil(),
        }))
        .unwrap();
        assert_eq!(value["type"], "newOwner");
        assert_eq!(value["ownerId"], Uuid::nil().to_string());

        let value = serde_json::to_value(Outbound::from(MatchEvent::Countdown { value: 2 })).unwrap();
        assert_eq!(value, json!({ "type": "countdown", "value": 2 }));

        let value = serde_json::to_value(ServerMsg::from(&RoomError::EmptyTeam)).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "empty_team");
    }

    #[test]
    fn chat_is_trimmed_and_capped() {
        assert_eq!(clamp_chat("  hi  "), "hi");
        assert_eq!(clamp_chat(&"x".repeat(500)).len(), MAX_CHAT_LEN);
    }
}
