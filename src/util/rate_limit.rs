//! Rate limiting for inbound socket messages

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Input updates per second; two per physics tick
pub const INPUT_RATE_LIMIT: u32 = 120;

/// Room commands per second (create, join, team changes, bots, ...)
pub const COMMAND_RATE_LIMIT: u32 = 10;

/// Per-connection rate limiter state
#[derive(Clone)]
pub struct SessionRateLimiter {
    input_limiter: Arc<Limiter>,
    command_limiter: Arc<Limiter>,
}

impl SessionRateLimiter {
    pub fn new() -> Self {
        Self {
            input_limiter: create_limiter(INPUT_RATE_LIMIT),
            command_limiter: create_limiter(COMMAND_RATE_LIMIT),
        }
    }

    /// Check if an input message is allowed (returns true if allowed)
    pub fn check_input(&self) -> bool {
        self.input_limiter.check().is_ok()
    }

    pub fn check_command(&self) -> bool {
        self.command_limiter.check().is_ok()
    }
}

impl Default for SessionRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_burst_is_capped() {
        let limiter = SessionRateLimiter::new();
        let allowed = (0..50).filter(|_| limiter.check_command()).count();
        assert_eq!(allowed, COMMAND_RATE_LIMIT as usize);
    }

    #[test]
    fn input_budget_is_independent_of_commands() {
        let limiter = SessionRateLimiter::new();
        while limiter.check_command() {}
        assert!(limiter.check_input());
    }
}
