//! Per-room physics world: ball, players and the fixed-step integrator

use tracing::debug;

use crate::util::time::tick_delta;

use super::bot::{ChaseBall, Control, TickView};
use super::constants::*;
use super::physics::{Body, PhysicsSystem, Separation};
use super::shot::ShotController;
use super::snapshot::{BallSnapshot, PlayerSnapshot, WorldSnapshot};
use super::{EntityId, InputState, Side};

/// World command errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    #[error("Unknown entity: {0}")]
    UnknownEntity(EntityId),

    #[error("Entity {0} is not human-controlled")]
    NotHumanControlled(EntityId),
}

/// One roster slot handed over by the room
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub id: EntityId,
    pub name: String,
    pub is_bot: bool,
}

/// Team assignment at match start, in kickoff order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    pub left: Vec<RosterEntry>,
    pub right: Vec<RosterEntry>,
}

/// The ball, with its decaying lateral spin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball {
    pub body: Body,
    pub spin_x: f32,
    pub spin_y: f32,
}

impl Ball {
    fn at_center() -> Self {
        Self {
            body: Body::new(FIELD_WIDTH / 2.0, FIELD_HEIGHT / 2.0, BALL_RADIUS, BALL_MASS),
            spin_x: 0.0,
            spin_y: 0.0,
        }
    }

    fn apply_spin(&mut self) {
        if self.body.speed() > SPIN_MIN_BALL_SPEED {
            self.body.vel_x += self.spin_x;
            self.body.vel_y += self.spin_y;
        }

        self.spin_x *= SPIN_DECAY;
        self.spin_y *= SPIN_DECAY;
        if self.spin_x.hypot(self.spin_y) < SPIN_EPSILON {
            self.spin_x = 0.0;
            self.spin_y = 0.0;
        }
    }
}

/// A player entity owned by the world for the match duration
#[derive(Debug)]
pub struct Player {
    pub id: EntityId,
    pub name: String,
    pub side: Side,
    pub number: u8,
    pub body: Body,
    pub control: Control,
    /// Input in effect for the current tick
    pub input: InputState,
    /// Seconds shoot has been held
    pub shoot_hold: f32,
}

impl Player {
    fn from_roster(entry: &RosterEntry, side: Side, index: usize, count: usize, tuning: &Tuning) -> Self {
        let (x, y) = kickoff_position(side, index, count);
        let control = if entry.is_bot {
            Control::bot(ChaseBall::new(tuning.bot_shot_release_secs))
        } else {
            Control::Human(InputState::default())
        };

        Self {
            id: entry.id,
            name: entry.name.clone(),
            side,
            number: (index + 1).min(u8::MAX as usize) as u8,
            body: Body::new(x, y, PLAYER_RADIUS, PLAYER_MASS),
            control,
            input: InputState::default(),
            shoot_hold: 0.0,
        }
    }

    /// Accelerate from held directions, then friction, cap, move, and keep
    /// inside the field.
    fn advance(&mut self) {
        let input = self.input;
        let body = &mut self.body;

        if input.up {
            body.vel_y -= PLAYER_ACCELERATION;
        }
        if input.down {
            body.vel_y += PLAYER_ACCELERATION;
        }
        if input.left {
            body.vel_x -= PLAYER_ACCELERATION;
        }
        if input.right {
            body.vel_x += PLAYER_ACCELERATION;
        }

        body.vel_x *= PLAYER_FRICTION;
        body.vel_y *= PLAYER_FRICTION;
        body.clamp_speed(PLAYER_MAX_SPEED);
        body.integrate();
        contain_player(body);
    }
}

/// Keep a player inside the padding-bounded field, goal mouths included
fn contain_player(body: &mut Body) {
    body.x = body
        .x
        .clamp(FIELD_PADDING + body.radius, FIELD_WIDTH - FIELD_PADDING - body.radius);
    body.y = body
        .y
        .clamp(FIELD_PADDING + body.radius, FIELD_HEIGHT - FIELD_PADDING - body.radius);
}

/// Keep the ball inside the renderable area, goal mouths included
fn contain_ball(body: &mut Body) {
    body.x = body.x.clamp(
        FIELD_PADDING - BALL_SAFETY_MARGIN,
        FIELD_WIDTH - FIELD_PADDING + BALL_SAFETY_MARGIN,
    );
    body.y = body.y.clamp(
        FIELD_PADDING - BALL_SAFETY_MARGIN,
        FIELD_HEIGHT - FIELD_PADDING + BALL_SAFETY_MARGIN,
    );
}

/// Authoritative simulation for one room
#[derive(Debug)]
pub struct SimulationWorld {
    players: Vec<Player>,
    ball: Ball,
    tuning: Tuning,
    tick: u64,
    /// Goal signalled but not yet cleared by a kickoff reset
    pending_goal: Option<Side>,
}

impl SimulationWorld {
    pub fn new(roster: &Roster, tuning: Tuning) -> Self {
        let mut players = Vec::with_capacity(roster.left.len() + roster.right.len());
        for (side, entries) in [(Side::Left, &roster.left), (Side::Right, &roster.right)] {
            for (i, entry) in entries.iter().enumerate() {
                players.push(Player::from_roster(entry, side, i, entries.len(), &tuning));
            }
        }

        Self {
            players,
            ball: Ball::at_center(),
            tuning,
            tick: 0,
            pending_goal: None,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn ball(&self) -> &Ball {
        &self.ball
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.players.iter().any(|p| &p.id == id)
    }

    /// Entities still on the field for `side`
    pub fn headcount(&self, side: Side) -> usize {
        self.players.iter().filter(|p| p.side == side).count()
    }

    /// Overwrite the held input of a human entity
    pub fn apply_input(&mut self, id: EntityId, input: InputState) -> Result<(), WorldError> {
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(WorldError::UnknownEntity(id))?;

        match &mut player.control {
            Control::Human(current) => {
                *current = input;
                Ok(())
            }
            Control::Bot(_) => Err(WorldError::NotHumanControlled(id)),
        }
    }

    /// Drop an entity; it takes no part in later ticks
    pub fn remove_entity(&mut self, id: EntityId) -> Result<Player, WorldError> {
        let index = self
            .players
            .iter()
            .position(|p| p.id == id)
            .ok_or(WorldError::UnknownEntity(id))?;
        Ok(self.players.remove(index))
    }

    /// Kickoff formation: ball to centre, players to their spots at rest
    pub fn reset_positions(&mut self) {
        self.ball = Ball::at_center();
        self.pending_goal = None;

        for side in [Side::Left, Side::Right] {
            let count = self.headcount(side);
            for (i, player) in self.players.iter_mut().filter(|p| p.side == side).enumerate() {
                let (x, y) = kickoff_position(side, i, count);
                player.body.x = x;
                player.body.y = y;
                player.body.stop();
                player.shoot_hold = 0.0;
            }
        }
    }

    /// Advance one fixed tick. Returns the scoring side if a goal was
    /// crossed this tick.
    ///
    /// After a goal the world stays frozen until `reset_positions`, so one
    /// crossing can never be reported twice.
    pub fn step(&mut self) -> Option<Side> {
        if self.pending_goal.is_some() {
            return None;
        }
        self.tick += 1;

        self.update_controls();
        self.update_players();
        self.update_ball();
        self.bounce_top_bottom();

        if let Some(scorer) = self.check_goal_lines() {
            contain_ball(&mut self.ball.body);
            self.pending_goal = Some(scorer);
            debug!(tick = self.tick, scorer = ?scorer, "Goal line crossed");
            return Some(scorer);
        }

        contain_ball(&mut self.ball.body);
        self.resolve_goal_posts();
        self.resolve_player_ball();
        self.resolve_player_pairs();
        self.enforce_limits();

        None
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            players: self.players.iter().map(PlayerSnapshot::from_player).collect(),
            ball: BallSnapshot::from_ball(&self.ball),
        }
    }

    fn update_controls(&mut self) {
        let (ball_x, ball_y) = (self.ball.body.x, self.ball.body.y);
        for player in &mut self.players {
            let view = TickView {
                self_x: player.body.x,
                self_y: player.body.y,
                ball_x,
                ball_y,
                shoot_hold: player.shoot_hold,
            };
            player.input = player.control.next_input(&view);
        }
    }

    fn update_players(&mut self) {
        let dt = tick_delta();
        for player in &mut self.players {
            player.advance();

            if player.input.shoot {
                player.shoot_hold += dt;
            } else if player.shoot_hold > 0.0 {
                if let Some(shot) =
                    ShotController::shoot(&player.body, &mut self.ball, player.shoot_hold, &player.input)
                {
                    debug!(
                        entity_id = %player.id,
                        power = shot.power,
                        hold = player.shoot_hold,
                        "Shot taken"
                    );
                }
                player.shoot_hold = 0.0;
            }
        }
    }

    fn update_ball(&mut self) {
        let ball = &mut self.ball;
        ball.apply_spin();
        ball.body.vel_x *= BALL_FRICTION;
        ball.body.vel_y *= BALL_FRICTION;
        ball.body.clamp_speed(BALL_MAX_SPEED);
        ball.body.integrate();
    }

    fn bounce_top_bottom(&mut self) {
        let body = &mut self.ball.body;
        if body.y - body.radius < FIELD_PADDING {
            body.y = FIELD_PADDING + body.radius;
            body.vel_y *= -WALL_RESTITUTION;
        }
        if body.y + body.radius > FIELD_HEIGHT - FIELD_PADDING {
            body.y = FIELD_HEIGHT - FIELD_PADDING - body.radius;
            body.vel_y *= -WALL_RESTITUTION;
        }
    }

    /// Goal check for the side walls; bounces when outside the mouth
    fn check_goal_lines(&mut self) -> Option<Side> {
        let tolerance = self.tuning.goal_line_tolerance;
        let body = &mut self.ball.body;
        let in_mouth = body.y > goal_top() - tolerance && body.y < goal_bottom() + tolerance;

        if body.x - body.radius < FIELD_PADDING {
            if in_mouth {
                return Some(Side::Right);
            }
            body.x = FIELD_PADDING + body.radius;
            body.vel_x *= -WALL_RESTITUTION;
        }

        if body.x + body.radius > FIELD_WIDTH - FIELD_PADDING {
            if in_mouth {
                return Some(Side::Left);
            }
            body.x = FIELD_WIDTH - FIELD_PADDING - body.radius;
            body.vel_x *= -WALL_RESTITUTION;
        }

        None
    }

    fn resolve_goal_posts(&mut self) {
        let posts = [
            (FIELD_PADDING, goal_top()),
            (FIELD_PADDING, goal_bottom()),
            (FIELD_WIDTH - FIELD_PADDING, goal_top()),
            (FIELD_WIDTH - FIELD_PADDING, goal_bottom()),
        ];

        for (x, y) in posts {
            PhysicsSystem::resolve_post_collision(
                &mut self.ball.body,
                x,
                y,
                GOAL_POST_RADIUS,
                WALL_RESTITUTION,
            );
        }
    }

    fn resolve_player_ball(&mut self) {
        for player in &mut self.players {
            PhysicsSystem::resolve_circle_collision(
                &mut player.body,
                &mut self.ball.body,
                Separation::PushSecond,
                COLLISION_RESTITUTION,
            );
        }
    }

    fn resolve_player_pairs(&mut self) {
        for i in 0..self.players.len() {
            let (head, tail) = self.players.split_at_mut(i + 1);
            let a = &mut head[i];
            for b in tail.iter_mut() {
                PhysicsSystem::resolve_circle_collision(
                    &mut a.body,
                    &mut b.body,
                    Separation::Symmetric,
                    COLLISION_RESTITUTION,
                );
            }
        }
    }

    /// Collision impulses and corrections can push past the caps
    fn enforce_limits(&mut self) {
        for player in &mut self.players {
            player.body.clamp_speed(PLAYER_MAX_SPEED);
            contain_player(&mut player.body);
        }
        self.ball.body.clamp_speed(BALL_MAX_SPEED);
        contain_ball(&mut self.ball.body);
    }

    #[cfg(test)]
    pub(crate) fn ball_mut(&mut self) -> &mut Ball {
        &mut self.ball
    }

    #[cfg(test)]
    pub(crate) fn player_mut(&mut self, id: &EntityId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| &p.id == id)
    }
}
