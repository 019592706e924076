//! Per-room match task: the fixed-rate scheduler driving one
//! `SimulationWorld` and its `MatchLifecycle`

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval, interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::time::tick_duration;

use super::constants::{Tuning, COUNTDOWN_STEP_MS, GOAL_PAUSE_MS};
use super::lifecycle::{MatchDuration, MatchLifecycle, MatchResult, MatchState, MatchStatus};
use super::snapshot::{BallSnapshot, PlayerSnapshot, SnapshotBuilder};
use super::world::{Roster, SimulationWorld, WorldError};
use super::{EntityId, InputState, Side};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events published by a running match
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MatchEvent {
    /// Per-tick snapshot
    GameState {
        tick: u64,
        players: Vec<PlayerSnapshot>,
        ball: BallSnapshot,
        #[serde(rename = "match")]
        status: MatchStatus,
    },

    Countdown { value: u8 },

    #[serde(rename_all = "camelCase")]
    Goal {
        team: Side,
        score_left: u32,
        score_right: u32,
    },

    /// Goal pause over, kickoff formation restored
    GoalResume,

    MatchEnd { result: MatchResult },
}

/// Commands from the owning room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchCommand {
    RemoveEntity(EntityId),
    /// `winner` is the side that still has entities, `None` if neither
    Forfeit { winner: Option<Side> },
    Stop,
}

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    command_tx: mpsc::UnboundedSender<MatchCommand>,
    inputs: Arc<DashMap<EntityId, InputState>>,
    events_tx: broadcast::Sender<MatchEvent>,
    status_rx: watch::Receiver<MatchStatus>,
}

impl MatchHandle {
    /// Overwrite an entity's held input; picked up by the next tick
    pub fn apply_input(&self, id: EntityId, input: InputState) {
        self.inputs.insert(id, input);
    }

    pub fn remove_entity(&self, id: EntityId) {
        self.inputs.remove(&id);
        self.send(MatchCommand::RemoveEntity(id));
    }

    pub fn forfeit(&self, winner: Option<Side>) {
        self.send(MatchCommand::Forfeit { winner });
    }

    pub fn stop(&self) {
        self.send(MatchCommand::Stop);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MatchEvent> {
        self.events_tx.subscribe()
    }

    pub fn status(&self) -> MatchStatus {
        *self.status_rx.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.status().state == MatchState::Finished
    }

    fn send(&self, command: MatchCommand) {
        // Only fails once the match task has exited
        if self.command_tx.send(command).is_err() {
            debug!(match_id = %self.id, "Match already finished, command ignored");
        }
    }
}

/// The authoritative match
pub struct GameMatch {
    id: Uuid,
    world: SimulationWorld,
    lifecycle: MatchLifecycle,
    command_rx: mpsc::UnboundedReceiver<MatchCommand>,
    inputs: Arc<DashMap<EntityId, InputState>>,
    events_tx: broadcast::Sender<MatchEvent>,
    status_tx: watch::Sender<MatchStatus>,
    snapshot_builder: SnapshotBuilder,
}

impl GameMatch {
    /// Create a new match
    pub fn new(
        id: Uuid,
        roster: &Roster,
        duration: MatchDuration,
        tuning: Tuning,
        snapshot_interval: u32,
    ) -> (Self, MatchHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let lifecycle = MatchLifecycle::new(duration);
        let (status_tx, status_rx) = watch::channel(lifecycle.status());
        let inputs = Arc::new(DashMap::new());

        let handle = MatchHandle {
            id,
            command_tx,
            inputs: inputs.clone(),
            events_tx: events_tx.clone(),
            status_rx,
        };

        let game_match = Self {
            id,
            world: SimulationWorld::new(roster, tuning),
            lifecycle,
            command_rx,
            inputs,
            events_tx,
            status_tx,
            snapshot_builder: SnapshotBuilder::new(snapshot_interval),
        };

        (game_match, handle)
    }

    /// Run countdown, play and goal pauses until the match finishes.
    ///
    /// Every timer lives in this task, so returning cancels all of them.
    pub async fn run(mut self) -> MatchResult {
        let second = Duration::from_millis(COUNTDOWN_STEP_MS);
        let goal_pause = Duration::from_millis(GOAL_PAUSE_MS);

        let mut physics = interval(tick_duration());
        physics.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut seconds = interval_at(Instant::now() + second, second);
        let mut resume_at: Option<Instant> = None;

        match self.lifecycle.start_countdown() {
            Ok(value) => {
                info!(match_id = %self.id, "Match countdown started");
                self.publish(MatchEvent::Countdown { value });
            }
            Err(e) => warn!(match_id = %self.id, error = %e, "Countdown not started"),
        }
        self.publish_status();

        loop {
            tokio::select! {
                biased;

                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!(match_id = %self.id, "All match handles dropped");
                        self.lifecycle.stop();
                    }
                },
                _ = wait_until(resume_at), if resume_at.is_some() => {
                    resume_at = None;
                    self.resume_after_goal();
                }
                _ = seconds.tick() => self.on_second(),
                _ = physics.tick(), if self.lifecycle.is_playing() => {
                    if self.run_tick().is_some() {
                        resume_at = Some(Instant::now() + goal_pause);
                    }
                }
            }

            if self.lifecycle.is_finished() {
                break;
            }
        }

        let result = self
            .lifecycle
            .result()
            .unwrap_or_else(|| MatchResult::fault(&self.lifecycle.status()));
        self.publish_status();
        self.publish(MatchEvent::MatchEnd { result });
        info!(match_id = %self.id, ticks = self.world.tick(), "Match loop stopped");

        result
    }

    fn handle_command(&mut self, command: MatchCommand) {
        match command {
            MatchCommand::RemoveEntity(id) => {
                self.inputs.remove(&id);
                match self.world.remove_entity(id) {
                    Ok(player) => info!(
                        match_id = %self.id,
                        entity_id = %id,
                        side = ?player.side,
                        "Entity removed from match"
                    ),
                    Err(e) => debug!(match_id = %self.id, error = %e, "Remove ignored"),
                }
            }
            MatchCommand::Forfeit { winner } => {
                info!(match_id = %self.id, winner = ?winner, "Match forfeited");
                self.lifecycle.forfeit(winner);
            }
            MatchCommand::Stop => {
                info!(match_id = %self.id, "Match stopped by room");
                self.lifecycle.stop();
            }
        }
    }

    /// Countdown step or one second of match clock
    fn on_second(&mut self) {
        match self.lifecycle.state() {
            MatchState::Countdown(_) => {
                if let Ok(value) = self.lifecycle.advance_countdown() {
                    self.publish(MatchEvent::Countdown { value });
                    if value == 0 {
                        info!(match_id = %self.id, "Kickoff");
                    }
                }
            }
            MatchState::Playing => {
                self.lifecycle.tick_clock();
            }
            _ => return,
        }
        self.publish_status();
    }

    /// One physics tick; returns the scoring side when a goal was credited
    fn run_tick(&mut self) -> Option<Side> {
        for entry in self.inputs.iter() {
            match self.world.apply_input(*entry.key(), *entry.value()) {
                Ok(()) => {}
                // Departed entities and bots keep no human slot
                Err(WorldError::UnknownEntity(_) | WorldError::NotHumanControlled(_)) => {}
            }
        }

        let mut credited = None;
        if let Some(scorer) = self.world.step() {
            match self.lifecycle.register_goal(scorer) {
                Some((score_left, score_right)) => {
                    info!(
                        match_id = %self.id,
                        team = ?scorer,
                        score_left,
                        score_right,
                        "Goal"
                    );
                    self.publish(MatchEvent::Goal {
                        team: scorer,
                        score_left,
                        score_right,
                    });
                    self.publish_status();
                    credited = Some(scorer);
                }
                None => self.world.reset_positions(),
            }
        }

        if self.snapshot_builder.should_send() {
            let snapshot = self.snapshot_builder.build(&self.world, self.lifecycle.status());
            self.publish(snapshot);
        }

        credited
    }

    fn resume_after_goal(&mut self) {
        self.world.reset_positions();
        if self.lifecycle.resume_after_goal() {
            self.snapshot_builder.force_next();
            self.publish(MatchEvent::GoalResume);
            self.publish_status();
        }
    }

    fn publish(&self, event: MatchEvent) {
        // No subscribers is fine: snapshots are fire-and-forget
        let _ = self.events_tx.send(event);
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.lifecycle.status());
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::lifecycle::{EndReason, Winner};
    use crate::game::world::RosterEntry;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn roster() -> Roster {
        Roster {
            left: vec![RosterEntry {
                id: Uuid::new_v4(),
                name: "ana".to_string(),
                is_bot: false,
            }],
            right: vec![RosterEntry {
                id: Uuid::new_v4(),
                name: "ben".to_string(),
                is_bot: false,
            }],
        }
    }

    fn new_match(roster: &Roster, secs: u32) -> (GameMatch, MatchHandle) {
        GameMatch::new(
            Uuid::new_v4(),
            roster,
            MatchDuration::try_from(secs).unwrap(),
            Tuning::default(),
            1,
        )
    }

    async fn next_event(rx: &mut broadcast::Receiver<MatchEvent>) -> MatchEvent {
        loop {
            match rx.recv().await {
                Ok(event) => return event,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    }

    /// Skip snapshots until a lifecycle event arrives
    async fn next_lifecycle_event(rx: &mut broadcast::Receiver<MatchEvent>) -> MatchEvent {
        loop {
            match next_event(rx).await {
                MatchEvent::GameState { .. } => continue,
                event => return event,
            }
        }
    }

    async fn wait_for_kickoff(rx: &mut broadcast::Receiver<MatchEvent>) {
        loop {
            if let MatchEvent::Countdown { value: 0 } = next_lifecycle_event(rx).await {
                return;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_is_three_two_one_zero_one_second_apart() {
        let (game, handle) = new_match(&roster(), 300);
        let mut rx = handle.subscribe();
        let task = tokio::spawn(game.run());

        let mut values = Vec::new();
        let mut stamps = Vec::new();
        while values.len() < 4 {
            if let MatchEvent::Countdown { value } = next_lifecycle_event(&mut rx).await {
                values.push(value);
                stamps.push(Instant::now());
            }
        }
        assert_eq!(values, vec![3, 2, 1, 0]);
        for pair in stamps.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_secs(1));
        }

        // Playing now: snapshots flow
        assert!(matches!(next_event(&mut rx).await, MatchEvent::GameState { .. }));
        assert_eq!(handle.status().state, MatchState::Playing);

        handle.stop();
        let result = task.await.unwrap();
        assert_eq!(result.reason, EndReason::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_expiry_without_goals_is_a_draw() {
        let (game, handle) = new_match(&roster(), 180);
        let mut rx = handle.subscribe();
        let task = tokio::spawn(game.run());

        let result = loop {
            match next_lifecycle_event(&mut rx).await {
                MatchEvent::MatchEnd { result } => break result,
                MatchEvent::Goal { .. } => panic!("no goal expected"),
                _ => {}
            }
        };

        assert_eq!(result.winner, Winner::Draw);
        assert_eq!(result.reason, EndReason::Clock);
        assert_eq!(result.duration, 180);
        assert_eq!(task.await.unwrap(), result);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn goal_pauses_then_resumes_at_kickoff() {
        let (mut game, handle) = new_match(&roster(), 300);
        {
            let ball = game.world.ball_mut();
            ball.body.x = 60.0;
            ball.body.vel_x = -10.0;
        }
        let mut rx = handle.subscribe();
        let task = tokio::spawn(game.run());

        wait_for_kickoff(&mut rx).await;

        let goal = next_lifecycle_event(&mut rx).await;
        let goal_at = Instant::now();
        match goal {
            MatchEvent::Goal {
                team,
                score_left,
                score_right,
            } => {
                assert_eq!(team, Side::Right);
                assert_eq!((score_left, score_right), (0, 1));
            }
            other => panic!("expected goal, got {other:?}"),
        }
        assert_eq!(handle.status().state, MatchState::GoalPause);

        assert!(matches!(
            next_lifecycle_event(&mut rx).await,
            MatchEvent::GoalResume
        ));
        assert!(Instant::now() - goal_at >= Duration::from_millis(GOAL_PAUSE_MS));

        match next_event(&mut rx).await {
            MatchEvent::GameState { ball, status, .. } => {
                assert!((ball.x - 600.0).abs() < 0.5);
                assert_eq!(status.score_right, 1);
                assert_eq!(status.state, MatchState::Playing);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }

        handle.stop();
        let result = task.await.unwrap();
        assert_eq!(result.winner, Winner::Right);
    }

    #[tokio::test(start_paused = true)]
    async fn forfeit_names_remaining_side_regardless_of_score() {
        let (game, handle) = new_match(&roster(), 300);
        let mut rx = handle.subscribe();
        let task = tokio::spawn(game.run());

        wait_for_kickoff(&mut rx).await;
        handle.forfeit(Some(Side::Right));

        let result = task.await.unwrap();
        assert_eq!(result.winner, Winner::Right);
        assert!(result.forfeit);

        match next_lifecycle_event(&mut rx).await {
            MatchEvent::MatchEnd { result: published } => assert_eq!(published, result),
            other => panic!("expected match end, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_halts_all_further_events() {
        let (game, handle) = new_match(&roster(), 300);
        let mut rx = handle.subscribe();
        let task = tokio::spawn(game.run());

        wait_for_kickoff(&mut rx).await;
        handle.stop();
        task.await.unwrap();

        // Drain whatever was published before the stop landed
        loop {
            match rx.try_recv() {
                Ok(MatchEvent::MatchEnd { .. }) => break,
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(e) => panic!("match end missing: {e:?}"),
            }
        }

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn inputs_move_players_and_removed_entities_disappear() {
        let roster = roster();
        let left = roster.left[0].id;
        let right = roster.right[0].id;
        let (game, handle) = new_match(&roster, 300);
        let mut rx = handle.subscribe();
        let task = tokio::spawn(game.run());

        wait_for_kickoff(&mut rx).await;
        handle.apply_input(
            left,
            InputState {
                right: true,
                ..Default::default()
            },
        );
        handle.remove_entity(right);
        // Unknown ids are ignored by the tick loop
        handle.apply_input(Uuid::new_v4(), InputState::default());

        let mut last = None;
        for _ in 0..30 {
            if let MatchEvent::GameState { players, .. } = next_event(&mut rx).await {
                last = Some(players);
            }
        }
        let players = last.expect("snapshots");
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].id, left);
        assert!(players[0].x > 140.0);

        handle.stop();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_survives_a_command_backlog() {
        let (game, handle) = new_match(&roster(), 300);
        for _ in 0..500 {
            handle.remove_entity(Uuid::new_v4());
        }
        handle.stop();
        let task = tokio::spawn(game.run());

        let result = task.await.unwrap();
        assert_eq!(result.reason, EndReason::Stopped);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_every_handle_stops_the_match() {
        let (game, handle) = new_match(&roster(), 300);
        let task = tokio::spawn(game.run());
        drop(handle);

        let result = task.await.unwrap();
        assert_eq!(result.reason, EndReason::Stopped);
    }
}
