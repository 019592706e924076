//! Bot steering

use std::fmt::Debug;

use super::constants::{shot_reach, BOT_DEAD_ZONE};
use super::InputState;

/// What a controller sees at the start of a tick
#[derive(Debug, Clone, Copy)]
pub struct TickView {
    pub self_x: f32,
    pub self_y: f32,
    pub ball_x: f32,
    pub ball_y: f32,
    /// Seconds the entity has been holding shoot
    pub shoot_hold: f32,
}

/// Policy that drives a bot entity
pub trait BotPolicy: Send + Debug {
    fn decide(&mut self, view: &TickView) -> InputState;
}

/// How an entity gets its input each tick
#[derive(Debug)]
pub enum Control {
    /// Latest input received from the client
    Human(InputState),
    Bot(Box<dyn BotPolicy>),
}

impl Control {
    pub fn bot(policy: impl BotPolicy + 'static) -> Self {
        Control::Bot(Box::new(policy))
    }

    pub fn is_bot(&self) -> bool {
        matches!(self, Control::Bot(_))
    }

    /// Input to use for this tick
    pub fn next_input(&mut self, view: &TickView) -> InputState {
        match self {
            Control::Human(input) => *input,
            Control::Bot(policy) => policy.decide(view),
        }
    }
}

/// Chases the ball on each axis and taps shoot when in reach.
///
/// Not path-aware: bots happily run through teammates.
#[derive(Debug, Clone, Copy)]
pub struct ChaseBall {
    /// Hold time after which shoot is released
    pub release_secs: f32,
}

impl ChaseBall {
    pub fn new(release_secs: f32) -> Self {
        Self { release_secs }
    }
}

impl BotPolicy for ChaseBall {
    fn decide(&mut self, view: &TickView) -> InputState {
        let dx = view.ball_x - view.self_x;
        let dy = view.ball_y - view.self_y;
        let in_reach = dx * dx + dy * dy <= shot_reach() * shot_reach();

        InputState {
            up: dy < -BOT_DEAD_ZONE,
            down: dy > BOT_DEAD_ZONE,
            left: dx < -BOT_DEAD_ZONE,
            right: dx > BOT_DEAD_ZONE,
            shoot: in_reach && view.shoot_hold <= self.release_secs,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(self_x: f32, self_y: f32, ball_x: f32, ball_y: f32, shoot_hold: f32) -> TickView {
        TickView {
            self_x,
            self_y,
            ball_x,
            ball_y,
            shoot_hold,
        }
    }

    #[test]
    fn steers_toward_ball_per_axis() {
        let mut bot = ChaseBall::new(0.1);
        let input = bot.decide(&view(100.0, 100.0, 300.0, 50.0, 0.0));
        assert!(input.right && !input.left);
        assert!(input.up && !input.down);
        assert!(!input.shoot);
    }

    #[test]
    fn dead_zone_suppresses_axis() {
        let mut bot = ChaseBall::new(0.1);
        let input = bot.decide(&view(100.0, 100.0, 108.0, 400.0, 0.0));
        assert!(!input.left && !input.right);
        assert!(input.down);
    }

    #[test]
    fn taps_shoot_in_reach() {
        let mut bot = ChaseBall::new(0.1);
        assert!(bot.decide(&view(100.0, 100.0, 125.0, 100.0, 0.0)).shoot);
        assert!(bot.decide(&view(100.0, 100.0, 125.0, 100.0, 0.05)).shoot);
        // Past the release threshold the bot lets go so the shot fires
        assert!(!bot.decide(&view(100.0, 100.0, 125.0, 100.0, 0.12)).shoot);
    }

    #[test]
    fn human_control_replays_latest_input() {
        let input = InputState {
            left: true,
            ..Default::default()
        };
        let mut control = Control::Human(input);
        assert!(!control.is_bot());
        assert_eq!(control.next_input(&view(0.0, 0.0, 0.0, 0.0, 0.0)), input);

        let mut control = Control::bot(ChaseBall::new(0.1));
        assert!(control.is_bot());
        assert!(control.next_input(&view(0.0, 0.0, 100.0, 0.0, 0.0)).right);
    }
}
