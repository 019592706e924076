//! Match lifecycle state machine: countdown, clock, score, goal pause and
//! the terminal result.
//!
//! Pure and time-free. The match task decides when a second has elapsed
//! and calls in; this type only guards which transitions are legal.

use serde::Serialize;
use tracing::info;

use super::constants::{COUNTDOWN_START, MATCH_DURATIONS};
use super::Side;

/// Lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("Unsupported match duration: {0}s (expected one of 180, 300, 600)")]
    UnsupportedDuration(u32),

    #[error("Cannot {action} while {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: MatchState,
    },
}

/// Validated match length in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MatchDuration(u32);

impl MatchDuration {
    pub fn secs(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for MatchDuration {
    type Error = MatchError;

    fn try_from(secs: u32) -> Result<Self, Self::Error> {
        if MATCH_DURATIONS.contains(&secs) {
            Ok(Self(secs))
        } else {
            Err(MatchError::UnsupportedDuration(secs))
        }
    }
}

impl Default for MatchDuration {
    fn default() -> Self {
        Self(super::constants::DEFAULT_MATCH_DURATION)
    }
}

/// Lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchState {
    Idle,
    /// Last countdown value announced
    Countdown(u8),
    Playing,
    GoalPause,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Left,
    Right,
    Draw,
}

impl From<Side> for Winner {
    fn from(side: Side) -> Self {
        match side {
            Side::Left => Winner::Left,
            Side::Right => Winner::Right,
        }
    }
}

/// Why the match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// Match clock ran out
    Clock,
    /// A side was emptied
    Forfeit,
    /// Stopped by the room
    Stopped,
    /// The match task died
    Fault,
}

/// Terminal outcome, produced once per match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub winner: Winner,
    pub score_left: u32,
    pub score_right: u32,
    pub duration: u32,
    pub forfeit: bool,
    pub reason: EndReason,
}

impl MatchResult {
    /// Forfeit-style result for a match whose task stopped unexpectedly
    pub fn fault(status: &MatchStatus) -> Self {
        Self {
            winner: winner_by_score(status.score_left, status.score_right),
            score_left: status.score_left,
            score_right: status.score_right,
            duration: status.duration,
            forfeit: true,
            reason: EndReason::Fault,
        }
    }
}

/// Public view of the lifecycle, attached to snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStatus {
    pub state: MatchState,
    pub score_left: u32,
    pub score_right: u32,
    pub time_remaining: u32,
    pub duration: u32,
}

fn winner_by_score(left: u32, right: u32) -> Winner {
    match left.cmp(&right) {
        std::cmp::Ordering::Greater => Winner::Left,
        std::cmp::Ordering::Less => Winner::Right,
        std::cmp::Ordering::Equal => Winner::Draw,
    }
}

/// Score, clock and phase for one match
#[derive(Debug, Clone)]
pub struct MatchLifecycle {
    state: MatchState,
    score_left: u32,
    score_right: u32,
    duration: MatchDuration,
    time_remaining: u32,
    result: Option<MatchResult>,
}

impl MatchLifecycle {
    pub fn new(duration: MatchDuration) -> Self {
        Self {
            state: MatchState::Idle,
            score_left: 0,
            score_right: 0,
            duration,
            time_remaining: duration.secs(),
            result: None,
        }
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == MatchState::Playing
    }

    pub fn is_finished(&self) -> bool {
        self.state == MatchState::Finished
    }

    pub fn result(&self) -> Option<MatchResult> {
        self.result
    }

    pub fn status(&self) -> MatchStatus {
        MatchStatus {
            state: self.state,
            score_left: self.score_left,
            score_right: self.score_right,
            time_remaining: self.time_remaining,
            duration: self.duration.secs(),
        }
    }

    /// `Idle -> Countdown(3)`; returns the value to announce
    pub fn start_countdown(&mut self) -> Result<u8, MatchError> {
        if self.state != MatchState::Idle {
            return Err(self.invalid("start countdown"));
        }
        self.state = MatchState::Countdown(COUNTDOWN_START);
        Ok(COUNTDOWN_START)
    }

    /// One second of countdown elapsed; returns the value to announce.
    /// Announcing 0 moves the match to `Playing`.
    pub fn advance_countdown(&mut self) -> Result<u8, MatchError> {
        let MatchState::Countdown(current) = self.state else {
            return Err(self.invalid("advance countdown"));
        };

        let next = current.saturating_sub(1);
        self.state = if next == 0 {
            MatchState::Playing
        } else {
            MatchState::Countdown(next)
        };
        Ok(next)
    }

    /// One second of match clock elapsed. Only counts while playing;
    /// returns the result when the clock runs out.
    pub fn tick_clock(&mut self) -> Option<MatchResult> {
        if self.state != MatchState::Playing {
            return None;
        }

        self.time_remaining = self.time_remaining.saturating_sub(1);
        if self.time_remaining == 0 {
            let winner = winner_by_score(self.score_left, self.score_right);
            return self.finish(winner, EndReason::Clock);
        }
        None
    }

    /// Credit a goal and freeze the clock. Goals outside `Playing` are
    /// ignored and return `None`.
    pub fn register_goal(&mut self, scorer: Side) -> Option<(u32, u32)> {
        if self.state != MatchState::Playing {
            return None;
        }

        match scorer {
            Side::Left => self.score_left += 1,
            Side::Right => self.score_right += 1,
        }
        self.state = MatchState::GoalPause;
        Some((self.score_left, self.score_right))
    }

    /// `GoalPause -> Playing`
    pub fn resume_after_goal(&mut self) -> bool {
        if self.state != MatchState::GoalPause {
            return false;
        }
        self.state = MatchState::Playing;
        true
    }

    /// End by forfeit. `winner` is the side that still has entities;
    /// `None` when both sides are empty.
    pub fn forfeit(&mut self, winner: Option<Side>) -> Option<MatchResult> {
        let winner = winner.map(Winner::from).unwrap_or(Winner::Draw);
        self.finish(winner, EndReason::Forfeit)
    }

    /// End on request of the room, scored as it stands
    pub fn stop(&mut self) -> Option<MatchResult> {
        let winner = winner_by_score(self.score_left, self.score_right);
        self.finish(winner, EndReason::Stopped)
    }

    fn finish(&mut self, winner: Winner, reason: EndReason) -> Option<MatchResult> {
        if self.result.is_some() {
            return None;
        }

        let result = MatchResult {
            winner,
            score_left: self.score_left,
            score_right: self.score_right,
            duration: self.duration.secs(),
            forfeit: matches!(reason, EndReason::Forfeit | EndReason::Fault),
            reason,
        };
        self.state = MatchState::Finished;
        self.result = Some(result);

        info!(
            winner = ?result.winner,
            score_left = result.score_left,
            score_right = result.score_right,
            reason = ?reason,
            "Match finished"
        );
        Some(result)
    }

    fn invalid(&self, action: &'static str) -> MatchError {
        MatchError::InvalidTransition {
            action,
            state: self.state,
        }
    }
}
