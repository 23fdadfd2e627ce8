//! Session creation and seating.
//!
//! A session is stored as soon as it is created, with placeholder names for
//! the empty seats. Each join fills the next seat and renames it in the
//! stored state. The game is playable once every seat is taken.

use crate::store::{SessionStore, StoreError};
use dashmap::DashMap;
use hexbound_core::{GameConfig, GameError, GameState, Seat};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum LobbyError {
    #[error("Session {0} not found or already started")]
    NotFound(String),

    #[error("Session is full")]
    SessionFull,

    #[error("Name must not be empty")]
    EmptyName,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Game(#[from] GameError),
}

/// Result of taking a seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seating {
    pub code: String,
    pub seat: Seat,
    /// Names of the seated players, in seat order
    pub players: Vec<String>,
    /// Every seat is now taken
    pub full: bool,
}

/// Sessions still waiting for players.
pub struct Lobby {
    store: Arc<dyn SessionStore>,
    config: GameConfig,
    /// Seated names per waiting session
    waiting: DashMap<String, Vec<String>>,
}

impl Lobby {
    pub fn new(store: Arc<dyn SessionStore>, config: GameConfig) -> Self {
        Self {
            store,
            config,
            waiting: DashMap::new(),
        }
    }

    pub fn seats(&self) -> u8 {
        self.config.seats
    }

    pub fn is_waiting(&self, code: &str) -> bool {
        self.waiting.contains_key(code)
    }

    /// Create a session with `host` in seat 0
    pub fn create(&self, host: String) -> Result<Seating, LobbyError> {
        let host = validate_name(host)?;
        let names = (0..self.config.seats)
            .map(|seat| match seat {
                0 => host.clone(),
                _ => format!("Seat {}", seat + 1),
            })
            .collect();
        let state = GameState::new(self.config, names)?;
        let code = self.store.create(&state)?;

        self.waiting.insert(code.clone(), vec![host.clone()]);
        info!(%code, host = %host, "session created");
        Ok(Seating {
            code,
            seat: 0,
            players: vec![host],
            full: false,
        })
    }

    /// Seat `name` in the next free seat of `code`
    pub fn join(&self, code: &str, name: String) -> Result<Seating, LobbyError> {
        let name = validate_name(name)?;
        let mut seated = self
            .waiting
            .get_mut(code)
            .ok_or_else(|| LobbyError::NotFound(code.to_string()))?;
        let seat = seated.len() as Seat;
        if seat >= self.config.seats {
            return Err(LobbyError::SessionFull);
        }

        let mut state = self.store.load(code)?;
        state.players[seat as usize].name = name.clone();
        self.store.save(code, &state)?;
        seated.push(name);

        let players = seated.clone();
        let full = players.len() == self.config.seats as usize;
        drop(seated); // Release the entry before removing it
        if full {
            self.waiting.remove(code);
            info!(%code, "session full");
        }

        Ok(Seating {
            code: code.to_string(),
            seat,
            players,
            full,
        })
    }

    /// Drop a session nobody is waiting in any more. Returns false if it
    /// has already started or is unknown.
    pub fn abandon(&self, code: &str) -> bool {
        if self.waiting.remove(code).is_none() {
            return false;
        }
        self.store.remove(code);
        info!(%code, "waiting session abandoned");
        true
    }
}

fn validate_name(name: String) -> Result<String, LobbyError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(LobbyError::EmptyName);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn lobby(seats: u8) -> (Lobby, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = GameConfig {
            seats,
            ..GameConfig::default()
        };
        (Lobby::new(store.clone(), config), store)
    }

    #[test]
    fn test_create_session() {
        let (lobby, store) = lobby(4);
        let seating = lobby.create("Host".to_string()).unwrap();

        assert_eq!(seating.seat, 0);
        assert!(!seating.full);
        assert!(lobby.is_waiting(&seating.code));
        let state = store.load(&seating.code).unwrap();
        assert_eq!(state.player_count(), 4);
        assert_eq!(state.players[0].name, "Host");
    }

    #[test]
    fn test_join_until_full() {
        let (lobby, store) = lobby(2);
        let code = lobby.create("Host".to_string()).unwrap().code;

        let seating = lobby.join(&code, "Player 2".to_string()).unwrap();
        assert_eq!(seating.seat, 1);
        assert!(seating.full);
        assert_eq!(seating.players, vec!["Host".to_string(), "Player 2".to_string()]);
        assert_eq!(store.load(&code).unwrap().players[1].name, "Player 2");

        // Can't join a started session
        assert!(matches!(
            lobby.join(&code, "Player 3".to_string()),
            Err(LobbyError::NotFound(_))
        ));
        assert!(!lobby.is_waiting(&code));
    }

    #[test]
    fn test_abandon_waiting_session() {
        let (lobby, store) = lobby(3);
        let code = lobby.create("Host".to_string()).unwrap().code;
        lobby.join(&code, "Guest".to_string()).unwrap();

        assert!(lobby.abandon(&code));
        assert!(!lobby.is_waiting(&code));
        assert!(store.is_empty());
        assert!(matches!(
            lobby.join(&code, "Late".to_string()),
            Err(LobbyError::NotFound(_))
        ));
        assert!(!lobby.abandon(&code));
    }

    #[test]
    fn test_started_session_is_not_abandoned() {
        let (lobby, store) = lobby(2);
        let code = lobby.create("Host".to_string()).unwrap().code;
        lobby.join(&code, "Guest".to_string()).unwrap();

        assert!(!lobby.abandon(&code));
        assert!(store.load(&code).is_ok());
    }

    #[test]
    fn test_join_errors() {
        let (lobby, _) = lobby(3);
        assert!(matches!(
            lobby.join("MISSING", "Someone".to_string()),
            Err(LobbyError::NotFound(_))
        ));
        assert!(matches!(lobby.create("   ".to_string()), Err(LobbyError::EmptyName)));
    }
}
