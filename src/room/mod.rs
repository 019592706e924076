//! Rooms: membership bookkeeping and the registry that owns each room's match

pub mod registry;
pub mod session;

pub use registry::{Room, RoomRegistry, RoomSettings};
pub use session::{Member, RoomSummary, RoomView, Seat, SessionRoom, TeamColors};

use crate::game::{EntityId, MatchError};

/// Room operation errors, reported back to the requesting session
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoomError {
    #[error("Room not found")]
    NotFound,

    #[error("Not in a room")]
    NotInRoom,

    #[error("Room is full")]
    Full,

    #[error("Wrong room password")]
    WrongPassword,

    #[error("Only the room owner can do that")]
    NotOwner,

    #[error("A match is in progress")]
    MatchInProgress,

    #[error("Both teams need at least one player")]
    EmptyTeam,

    #[error("No match is running")]
    NoActiveMatch,

    #[error("Unknown room member: {0}")]
    UnknownMember(EntityId),

    #[error(transparent)]
    InvalidDuration(#[from] MatchError),

    #[error("You cannot kick yourself")]
    SelfKick,
}

impl RoomError {
    /// Stable code for the wire
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::NotFound => "room_not_found",
            RoomError::NotInRoom => "not_in_room",
            RoomError::Full => "room_full",
            RoomError::WrongPassword => "wrong_password",
            RoomError::NotOwner => "not_owner",
            RoomError::MatchInProgress => "match_in_progress",
            RoomError::EmptyTeam => "empty_team",
            RoomError::NoActiveMatch => "no_active_match",
            RoomError::UnknownMember(_) => "unknown_member",
            RoomError::InvalidDuration(_) => "invalid_duration",
            RoomError::SelfKick => "self_kick",
        }
    }
}
