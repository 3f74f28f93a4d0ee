//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::util::rate_limit::DEFAULT_INPUT_RATE;
use crate::util::time::SIMULATION_TPS;

/// Log output format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Human readable or JSON log lines
    pub log_format: LogFormat,
    /// Allowed client origins for CORS ("*" allows any)
    pub client_origin: String,
    /// Optional JSON deck replacing the built-in catalog
    pub card_catalog_path: Option<PathBuf>,
    /// Inbound WebSocket frames allowed per connection per second
    pub input_rate_limit: u32,
    /// Rules shared by every match this server hosts
    pub rules: MatchRules,
}

/// Per-match rules and timing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchRules {
    /// Health each player starts a match with
    pub max_health: i32,
    /// Fixed length of a round's card sequence
    pub cards_per_round: usize,
    /// Hard limit on the Round phase
    pub round_duration: Duration,
    /// Simulation ticks per second
    pub tick_rate_hz: u32,
    /// Re-send the current phase every N ticks
    pub phase_heartbeat_ticks: u32,
    /// How long a finished match waits for a rematch before closing
    pub rematch_grace: Duration,
}

/// Longest accepted Round phase
pub const MAX_ROUND_DURATION: Duration = Duration::from_secs(60 * 60);
/// Longest accepted wait for a rematch
pub const MAX_REMATCH_GRACE: Duration = Duration::from_secs(24 * 60 * 60);

impl MatchRules {
    /// Reject rules a match cannot run with, naming the offending variable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_health <= 0 {
            return Err(ConfigError::Invalid("MAX_HEALTH"));
        }
        if self.cards_per_round == 0 {
            return Err(ConfigError::Invalid("CARDS_PER_ROUND"));
        }
        if self.round_duration.is_zero() || self.round_duration > MAX_ROUND_DURATION {
            return Err(ConfigError::Invalid("ROUND_DURATION_SECS"));
        }
        if self.tick_rate_hz == 0 {
            return Err(ConfigError::Invalid("TICK_RATE_HZ"));
        }
        if self.phase_heartbeat_ticks == 0 {
            return Err(ConfigError::Invalid("PHASE_HEARTBEAT_TICKS"));
        }
        if self.rematch_grace > MAX_REMATCH_GRACE {
            return Err(ConfigError::Invalid("REMATCH_GRACE_SECS"));
        }
        Ok(())
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.tick_rate_hz.max(1) as u64)
    }
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            max_health: 7,
            cards_per_round: 3,
            round_duration: Duration::from_secs(10),
            tick_rate_hz: SIMULATION_TPS,
            phase_heartbeat_ticks: 1,
            rematch_grace: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("pretty") | Err(_) => LogFormat::Pretty,
            Ok(_) => return Err(ConfigError::Invalid("LOG_FORMAT")),
        };

        let defaults = MatchRules::default();
        let rules = MatchRules {
            max_health: parse_or("MAX_HEALTH", defaults.max_health)?,
            cards_per_round: parse_or("CARDS_PER_ROUND", defaults.cards_per_round)?,
            round_duration: Duration::from_secs(parse_or(
                "ROUND_DURATION_SECS",
                defaults.round_duration.as_secs(),
            )?),
            tick_rate_hz: parse_or("TICK_RATE_HZ", defaults.tick_rate_hz)?,
            phase_heartbeat_ticks: parse_or("PHASE_HEARTBEAT_TICKS", defaults.phase_heartbeat_ticks)?,
            rematch_grace: Duration::from_secs(parse_or(
                "REMATCH_GRACE_SECS",
                defaults.rematch_grace.as_secs(),
            )?),
        };

        rules.validate()?;

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,

            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),
            card_catalog_path: env::var("CARD_CATALOG_PATH").ok().map(PathBuf::from),
            input_rate_limit: parse_or("INPUT_RATE_LIMIT", DEFAULT_INPUT_RATE)?,

            rules,
        })
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
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
