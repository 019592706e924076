//! Field geometry, physics constants and tunable simulation parameters
//!
//! The numeric constants are shared with clients for interoperable
//! snapshots and must not drift.

use super::Side;

pub const FIELD_WIDTH: f32 = 1200.0;
pub const FIELD_HEIGHT: f32 = 600.0;
pub const FIELD_PADDING: f32 = 40.0;

pub const GOAL_HEIGHT: f32 = 160.0;
pub const GOAL_POST_RADIUS: f32 = 4.0;

pub const PLAYER_RADIUS: f32 = 18.0;
pub const PLAYER_MAX_SPEED: f32 = 5.0;
pub const PLAYER_ACCELERATION: f32 = 0.6;
pub const PLAYER_FRICTION: f32 = 0.88;
pub const PLAYER_MASS: f32 = 1.0;

pub const BALL_RADIUS: f32 = 10.0;
pub const BALL_FRICTION: f32 = 0.985;
pub const BALL_MAX_SPEED: f32 = 18.0;
pub const BALL_MASS: f32 = 0.3;

/// Restitution for ball against walls and posts
pub const WALL_RESTITUTION: f32 = 0.8;
/// Impulse damping for body-body collisions
pub const COLLISION_RESTITUTION: f32 = 0.9;
/// How far past the padding the ball may sit inside a goal mouth
pub const BALL_SAFETY_MARGIN: f32 = 20.0;

pub const SHOT_MIN_POWER: f32 = 5.0;
pub const SHOT_MAX_POWER: f32 = 18.0;
/// Power gained per second of holding shoot
pub const SHOT_CHARGE_RATE: f32 = 12.0;
/// Extra reach beyond touching distance
pub const SHOT_CONTACT_SLACK: f32 = 5.0;

/// Lateral spin applied by a curve modifier (velocity units per tick)
pub const CURVE_SPIN: f32 = 0.15;
/// Per-tick spin multiplier
pub const SPIN_DECAY: f32 = 0.96;
/// Spin below this magnitude is dropped
pub const SPIN_EPSILON: f32 = 0.005;
/// Spin only acts while the ball moves faster than this
pub const SPIN_MIN_BALL_SPEED: f32 = 0.5;

/// Bots ignore axis offsets smaller than this
pub const BOT_DEAD_ZONE: f32 = 10.0;

pub const GOAL_PAUSE_MS: u64 = 2000;
pub const COUNTDOWN_STEP_MS: u64 = 1000;
pub const COUNTDOWN_START: u8 = 3;

pub const MATCH_DURATIONS: [u32; 3] = [180, 300, 600];
pub const DEFAULT_MATCH_DURATION: u32 = 300;

/// Top edge of the goal mouth
pub fn goal_top() -> f32 {
    FIELD_HEIGHT / 2.0 - GOAL_HEIGHT / 2.0
}

/// Bottom edge of the goal mouth
pub fn goal_bottom() -> f32 {
    FIELD_HEIGHT / 2.0 + GOAL_HEIGHT / 2.0
}

/// Maximum centre distance at which a kicker can still strike the ball
pub fn shot_reach() -> f32 {
    PLAYER_RADIUS + BALL_RADIUS + SHOT_CONTACT_SLACK
}

/// Kickoff spot for the `index`-th of `count` players on a side
pub fn kickoff_position(side: Side, index: usize, count: usize) -> (f32, f32) {
    let spacing = FIELD_HEIGHT / (count as f32 + 1.0);
    let offset = 100.0 + (index % 2) as f32 * 80.0;
    let x = match side {
        Side::Left => FIELD_PADDING + offset,
        Side::Right => FIELD_WIDTH - FIELD_PADDING - offset,
    };
    (x, spacing * (index as f32 + 1.0))
}

/// Simulation knobs read from config
#[derive(Debug, Clone, Copy)]
pub struct Tuning {
    /// Slack added to each end of the goal mouth when testing a crossing
    pub goal_line_tolerance: f32,
    /// Bots release shoot once they have held it this long (seconds)
    pub bot_shot_release_secs: f32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            goal_line_tolerance: 5.0,
            bot_shot_release_secs: 0.1,
        }
    }
}
