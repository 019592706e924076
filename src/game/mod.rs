//! Authoritative match simulation modules

pub mod bot;
pub mod constants;
pub mod lifecycle;
pub mod r#match;
pub mod physics;
pub mod shot;
pub mod snapshot;
pub mod world;

pub use lifecycle::{EndReason, MatchDuration, MatchError, MatchResult, MatchState, MatchStatus, Winner};
pub use r#match::{GameMatch, MatchCommand, MatchEvent, MatchHandle};
pub use world::{Roster, RosterEntry, SimulationWorld};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a player entity (human session id or generated bot id)
pub type EntityId = Uuid;

/// Team side on the field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// Latest held control state for one entity.
///
/// Every field is overwritten on each update; there is no queue, so this
/// always represents what the client is currently holding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InputState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub shoot: bool,
    pub curve_left: bool,
    pub curve_right: bool,
    /// Pointer aim in field coordinates
    pub aim_x: Option<f32>,
    pub aim_y: Option<f32>,
}

impl InputState {
    /// Pointer aim, only when both coordinates are present and finite
    pub fn aim(&self) -> Option<(f32, f32)> {
        match (self.aim_x, self.aim_y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some((x, y)),
            _ => None,
        }
    }
}
