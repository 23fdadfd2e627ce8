//! Session persistence.
//!
//! The session actor loads the latest snapshot before every command and saves
//! after every successful mutation. `MemoryStore` keeps JSON snapshots in a
//! concurrent map; any other backend only has to implement `SessionStore`.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hexbound_core::GameState;
use rand::Rng;
use thiserror::Error;

/// Length of a session code
pub const CODE_LENGTH: usize = 7;

/// Unambiguous characters for codes people read out to each other
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session {0} not found")]
    NotFound(String),

    #[error("Snapshot encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Where session snapshots live
pub trait SessionStore: Send + Sync + 'static {
    /// Store a new session and return its code
    fn create(&self, state: &GameState) -> Result<String, StoreError>;

    /// Latest snapshot of a session
    fn load(&self, code: &str) -> Result<GameState, StoreError>;

    /// Replace the snapshot of an existing session
    fn save(&self, code: &str, state: &GameState) -> Result<(), StoreError>;

    /// Forget a finished session
    fn remove(&self, code: &str);
}

/// Random session code
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// In-process store of JSON snapshots.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for MemoryStore {
    fn create(&self, state: &GameState) -> Result<String, StoreError> {
        let snapshot = serde_json::to_string(state)?;
        loop {
            let code = generate_code();
            if let Entry::Vacant(slot) = self.sessions.entry(code.clone()) {
                slot.insert(snapshot);
                return Ok(code);
            }
        }
    }

    fn load(&self, code: &str) -> Result<GameState, StoreError> {
        let snapshot = self
            .sessions
            .get(code)
            .ok_or_else(|| StoreError::NotFound(code.to_string()))?;
        Ok(serde_json::from_str(snapshot.value())?)
    }

    fn save(&self, code: &str, state: &GameState) -> Result<(), StoreError> {
        let snapshot = serde_json::to_string(state)?;
        let mut slot = self
            .sessions
            .get_mut(code)
            .ok_or_else(|| StoreError::NotFound(code.to_string()))?;
        *slot = snapshot;
        Ok(())
    }

    fn remove(&self, code: &str) {
        self.sessions.remove(code);
    }
}
