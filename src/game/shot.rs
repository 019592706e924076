//! Shot charging and curve

use super::constants::{
    shot_reach, CURVE_SPIN, SHOT_CHARGE_RATE, SHOT_MAX_POWER, SHOT_MIN_POWER,
};
use super::physics::Body;
use super::world::Ball;
use super::InputState;

/// Aim points closer than this to the kicker carry no usable direction
const MIN_AIM_DISTANCE: f32 = 1.0;

/// Outcome of a successful kick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shot {
    pub power: f32,
    pub dir_x: f32,
    pub dir_y: f32,
    pub spin_x: f32,
    pub spin_y: f32,
}

/// Converts a released shoot hold into a ball impulse
pub struct ShotController;

impl ShotController {
    /// Impulse magnitude for a hold of `hold_secs`
    pub fn power(hold_secs: f32) -> f32 {
        (SHOT_MIN_POWER + hold_secs.max(0.0) * SHOT_CHARGE_RATE).clamp(SHOT_MIN_POWER, SHOT_MAX_POWER)
    }

    /// Whether `kicker` is close enough to strike `ball`
    pub fn in_reach(kicker: &Body, ball: &Body) -> bool {
        let dx = ball.x - kicker.x;
        let dy = ball.y - kicker.y;
        dx * dx + dy * dy <= shot_reach() * shot_reach()
    }

    /// Kick the ball away from `kicker`.
    ///
    /// Out of reach (or exactly on top of the ball, with no direction) the
    /// shot is dropped and `None` is returned.
    pub fn shoot(kicker: &Body, ball: &mut Ball, hold_secs: f32, input: &InputState) -> Option<Shot> {
        let dx = ball.body.x - kicker.x;
        let dy = ball.body.y - kicker.y;
        let dist = (dx * dx + dy * dy).sqrt();

        if dist > shot_reach() || dist <= f32::EPSILON {
            return None;
        }

        let dir_x = dx / dist;
        let dir_y = dy / dist;
        let power = Self::power(hold_secs);

        ball.body.vel_x += dir_x * power;
        ball.body.vel_y += dir_y * power;

        let (spin_x, spin_y) = Self::curve(dir_x, dir_y, kicker, input);
        ball.spin_x = spin_x;
        ball.spin_y = spin_y;

        Some(Shot {
            power,
            dir_x,
            dir_y,
            spin_x,
            spin_y,
        })
    }

    /// Lateral spin for a shot travelling along (`dir_x`, `dir_y`).
    ///
    /// Screen space has y pointing down, so the right-hand perpendicular of
    /// the travel direction is (-dir_y, dir_x).
    fn curve(dir_x: f32, dir_y: f32, kicker: &Body, input: &InputState) -> (f32, f32) {
        let (right_x, right_y) = (-dir_y, dir_x);

        match (input.curve_left, input.curve_right) {
            (true, false) => return (-right_x * CURVE_SPIN, -right_y * CURVE_SPIN),
            (false, true) => return (right_x * CURVE_SPIN, right_y * CURVE_SPIN),
            _ => {}
        }

        let Some((aim_x, aim_y)) = input.aim() else {
            return (0.0, 0.0);
        };

        let ax = aim_x - kicker.x;
        let ay = aim_y - kicker.y;
        let len = (ax * ax + ay * ay).sqrt();
        if len < MIN_AIM_DISTANCE {
            return (0.0, 0.0);
        }

        // Sine of the angle from shot direction to aim; positive bends right
        let side = (dir_x * ay - dir_y * ax) / len;
        (right_x * CURVE_SPIN * side, right_y * CURVE_SPIN * side)
    }
}
