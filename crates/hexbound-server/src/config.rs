//! Server configuration from the environment.

use hexbound_core::GameConfig;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime settings for the server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (`HEXBOUND_ADDR`)
    pub addr: SocketAddr,
    /// Time a seat has to act before its turn is resolved for it
    /// (`HEXBOUND_TURN_TIMEOUT_SECS`)
    pub turn_timeout: Duration,
    /// HS256 secret for seat tokens (`HEXBOUND_TOKEN_SECRET`)
    pub token_secret: String,
    /// Seats per session (`HEXBOUND_SEATS`)
    pub seats: u8,
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let addr: SocketAddr = parse_or(&lookup, "HEXBOUND_ADDR", "0.0.0.0:8080".parse().ok())?;
        let timeout_secs: u64 = parse_or(&lookup, "HEXBOUND_TURN_TIMEOUT_SECS", Some(30))?;
        let seats: u8 = parse_or(&lookup, "HEXBOUND_SEATS", Some(4))?;
        if !(2..=4).contains(&seats) {
            return Err(ConfigError::Invalid {
                name: "HEXBOUND_SEATS",
                value: seats.to_string(),
            });
        }

        let token_secret = match lookup("HEXBOUND_TOKEN_SECRET") {
            Some(secret) if !secret.is_empty() => secret,
            _ => {
                warn!("HEXBOUND_TOKEN_SECRET not set, seat tokens will not survive a restart");
                rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(32)
                    .map(char::from)
                    .collect()
            }
        };

        Ok(Self {
            addr,
            turn_timeout: Duration::from_secs(timeout_secs),
            token_secret,
            seats,
        })
    }

    /// Rules for new sessions
    pub fn game_config(&self) -> GameConfig {
        GameConfig {
            seats: self.seats,
            ..GameConfig::default()
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: Option<T>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match (lookup(name), default) {
        (Some(value), _) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(ConfigError::Invalid {
            name,
            value: String::new(),
        }),
    }
}
