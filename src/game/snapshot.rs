//! Snapshot building and rounding

use serde::Serialize;

use super::world::{Ball, Player, SimulationWorld};
use super::{EntityId, MatchEvent, MatchStatus, Side};

/// Positions go out with one decimal
pub fn round_position(v: f32) -> f32 {
    (v * 10.0).round() / 10.0
}

/// Velocities go out with two decimals
pub fn round_velocity(v: f32) -> f32 {
    (v * 100.0).round() / 100.0
}

/// Player state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: EntityId,
    pub name: String,
    pub team: Side,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub number: u8,
    pub shoot_hold_time: f32,
    pub is_bot: bool,
}

impl PlayerSnapshot {
    pub fn from_player(p: &Player) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            team: p.side,
            x: round_position(p.body.x),
            y: round_position(p.body.y),
            vx: round_velocity(p.body.vel_x),
            vy: round_velocity(p.body.vel_y),
            number: p.number,
            shoot_hold_time: round_velocity(p.shoot_hold),
            is_bot: p.control.is_bot(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BallSnapshot {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl BallSnapshot {
    pub fn from_ball(ball: &Ball) -> Self {
        Self {
            x: round_position(ball.body.x),
            y: round_position(ball.body.y),
            vx: round_velocity(ball.body.vel_x),
            vy: round_velocity(ball.body.vel_y),
        }
    }
}

/// Read-only view of all entity kinematics at a tick boundary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorldSnapshot {
    pub players: Vec<PlayerSnapshot>,
    pub ball: BallSnapshot,
}

/// Decides which ticks publish a snapshot
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        let snapshot_interval = snapshot_interval.max(1);
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval,
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (kickoff after a goal)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    pub fn build(&self, world: &SimulationWorld, status: MatchStatus) -> MatchEvent {
        let WorldSnapshot { players, ball } = world.snapshot();
        MatchEvent::GameState {
            tick: world.tick(),
            players,
            ball,
            status,
        }
    }
}
