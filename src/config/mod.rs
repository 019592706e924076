//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::game::constants::Tuning;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub log_json: bool,
    /// Allowed client origins for CORS, comma-separated
    pub client_origin: String,

    /// How far past the goal line the ball must travel to score
    pub goal_line_tolerance: f32,
    /// Hold time after which bots release shoot
    pub bot_shot_release_secs: f32,
    /// Publish a snapshot every N physics ticks
    pub snapshot_every_ticks: u32,
    /// Upper bound on room capacity
    pub max_players_per_room: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
        };
        let defaults = Tuning::default();

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json: lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            client_origin: lookup("CLIENT_ORIGIN")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),

            goal_line_tolerance: parse_or(
                &lookup,
                "GOAL_LINE_TOLERANCE",
                defaults.goal_line_tolerance,
            )?,
            bot_shot_release_secs: parse_or(
                &lookup,
                "BOT_SHOT_RELEASE_SECS",
                defaults.bot_shot_release_secs,
            )?,
            snapshot_every_ticks: parse_or(&lookup, "SNAPSHOT_EVERY_TICKS", 1)?,
            max_players_per_room: parse_or(&lookup, "MAX_PLAYERS_PER_ROOM", 10)?,
        };

        if !(config.goal_line_tolerance.is_finite() && config.goal_line_tolerance >= 0.0) {
            return Err(ConfigError::Invalid("GOAL_LINE_TOLERANCE"));
        }
        if !(config.bot_shot_release_secs.is_finite() && config.bot_shot_release_secs >= 0.0) {
            return Err(ConfigError::Invalid("BOT_SHOT_RELEASE_SECS"));
        }
        if config.snapshot_every_ticks == 0 {
            return Err(ConfigError::Invalid("SNAPSHOT_EVERY_TICKS"));
        }
        if config.max_players_per_room < 2 {
            return Err(ConfigError::Invalid("MAX_PLAYERS_PER_ROOM"));
        }

        Ok(config)
    }

    /// Simulation tuning for new matches
    pub fn tuning(&self) -> Tuning {
        Tuning {
            goal_line_tolerance: self.goal_line_tolerance,
            bot_shot_release_secs: self.bot_shot_release_secs,
        }
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server_addr.port(), 3000);
        assert_eq!(config.log_level, "info");
        assert!(!config.log_json);
        assert_eq!(config.goal_line_tolerance, 5.0);
        assert_eq!(config.bot_shot_release_secs, 0.1);
        assert_eq!(config.snapshot_every_ticks, 1);
        assert_eq!(config.max_players_per_room, 10);
    }

    #[test]
    fn port_wins_over_server_addr() {
        let config = load(&[("PORT", "8081"), ("SERVER_ADDR", "127.0.0.1:9000")]).unwrap();
        assert_eq!(config.server_addr.port(), 8081);

        let config = load(&[("SERVER_ADDR", "127.0.0.1:9000")]).unwrap();
        assert_eq!(config.server_addr.to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn tuning_comes_from_env() {
        let config = load(&[("GOAL_LINE_TOLERANCE", "0"), ("BOT_SHOT_RELEASE_SECS", "0.25")]).unwrap();
        let tuning = config.tuning();
        assert_eq!(tuning.goal_line_tolerance, 0.0);
        assert_eq!(tuning.bot_shot_release_secs, 0.25);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            load(&[("GOAL_LINE_TOLERANCE", "far")]),
            Err(ConfigError::Invalid("GOAL_LINE_TOLERANCE"))
        ));
        assert!(matches!(
            load(&[("GOAL_LINE_TOLERANCE", "-1")]),
            Err(ConfigError::Invalid("GOAL_LINE_TOLERANCE"))
        ));
        assert!(matches!(
            load(&[("SNAPSHOT_EVERY_TICKS", "0")]),
            Err(ConfigError::Invalid("SNAPSHOT_EVERY_TICKS"))
        ));
        assert!(matches!(
            load(&[("PORT", "not-a-port")]),
            Err(ConfigError::InvalidAddress)
        ));
    }
}
