//! Per-session actor.
//!
//! Each started session is owned by one tokio task. Commands reach it over an
//! mpsc channel and are answered through a oneshot, so validation and
//! mutation never interleave. For every command the actor loads the latest
//! snapshot, applies the command, saves, and only then fans out the
//! notifications. A failed save drops the mutated copy.
//!
//! The actor also owns the turn timer: whenever the game starts waiting on
//! something new it arms a deadline, and when the deadline passes it resolves
//! the wait with `GameState::expire_turn`.

use crate::store::{SessionStore, StoreError};
use hexbound_core::{Audience, Command, GameError, GameEvent, GamePhase, GameState, Notification, Seat};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Queue depth per session
const MAILBOX_SIZE: usize = 64;

/// Delivers events to whoever is attached to a session's seats.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, session: &str, audience: Audience, event: &GameEvent);
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// The rules refused the command
    #[error(transparent)]
    Rejected(#[from] GameError),

    /// Loading or saving failed; the command can be retried
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The session actor is gone
    #[error("Session unavailable")]
    Unavailable,
}

enum SessionRequest {
    Apply {
        seat: Seat,
        command: Command,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Snapshot {
        reply: oneshot::Sender<Result<GameState, SessionError>>,
    },
}

/// Handle to a running session actor.
#[derive(Clone)]
pub struct SessionHandle {
    code: String,
    tx: mpsc::Sender<SessionRequest>,
}

impl SessionHandle {
    /// Spawn the actor for a session already present in `store`
    pub fn spawn(
        code: String,
        store: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        turn_timeout: Duration,
    ) -> Self {
        Self::spawn_with_rng(code, store, notifier, turn_timeout, StdRng::from_entropy())
    }

    pub fn spawn_with_rng(
        code: String,
        store: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        turn_timeout: Duration,
        rng: StdRng,
    ) -> Self {
        let (tx, rx) = mpsc::channel(MAILBOX_SIZE);
        let actor = SessionActor {
            code: code.clone(),
            store,
            notifier,
            turn_timeout,
            rng,
            deadline: None,
            waiting_on: None,
            finished: false,
        };
        tokio::spawn(actor.run(rx));
        Self { code, tx }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Apply a command for `seat`. Events go out through the notifier.
    pub async fn apply(&self, seat: Seat, command: Command) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(SessionRequest::Apply {
                seat,
                command,
                reply,
            })
            .await
            .map_err(|_| SessionError::Unavailable)?;
        response.await.map_err(|_| SessionError::Unavailable)?
    }

    pub async fn snapshot(&self) -> Result<GameState, SessionError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(SessionRequest::Snapshot { reply })
            .await
            .map_err(|_| SessionError::Unavailable)?;
        response.await.map_err(|_| SessionError::Unavailable)?
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// What the game is waiting on; a change re-arms the timer
#[derive(Debug, Clone, PartialEq, Eq)]
struct WaitKey {
    phase: GamePhase,
    seat: Seat,
    turn: u32,
}

impl WaitKey {
    fn of(state: &GameState) -> Option<Self> {
        if state.is_finished() {
            return None;
        }
        Some(Self {
            phase: state.phase.clone(),
            seat: state.current_player,
            turn: state.turn_number,
        })
    }
}

struct SessionActor {
    code: String,
    store: Arc<dyn SessionStore>,
    notifier: Arc<dyn Notifier>,
    turn_timeout: Duration,
    rng: StdRng,
    deadline: Option<Instant>,
    waiting_on: Option<WaitKey>,
    finished: bool,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::Receiver<SessionRequest>) {
        info!(code = %self.code, "session started");
        match self.store.load(&self.code) {
            Ok(state) => {
                self.rearm(&state, true);
                self.notifier.notify(
                    &self.code,
                    Audience::Broadcast,
                    &GameEvent::ActionNeeded {
                        turn: state.current_player,
                    },
                );
            }
            Err(e) => {
                error!(code = %self.code, error = %e, "could not load session");
                return;
            }
        }

        while !self.finished {
            let deadline = self.deadline;
            let timer = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                request = rx.recv() => match request {
                    Some(request) => self.handle(request),
                    None => break,
                },
                _ = timer => self.expire(),
            }
        }

        info!(code = %self.code, "session stopped");
    }

    fn handle(&mut self, request: SessionRequest) {
        match request {
            SessionRequest::Apply {
                seat,
                command,
                reply,
            } => {
                let result = self.apply(seat, command);
                let _ = reply.send(result);
            }
            SessionRequest::Snapshot { reply } => {
                let result = self.store.load(&self.code).map_err(SessionError::from);
                let _ = reply.send(result);
            }
        }
    }

    fn apply(&mut self, seat: Seat, command: Command) -> Result<(), SessionError> {
        let mut state = self.store.load(&self.code)?;
        let name = command.name();
        let notifications = state.apply_with_rng(seat, command, &mut self.rng).map_err(|e| {
            warn!(code = %self.code, seat, command = name, error = %e, "command rejected");
            e
        })?;
        self.commit(state, notifications, false)
    }

    fn expire(&mut self) {
        let mut state = match self.store.load(&self.code) {
            Ok(state) => state,
            Err(e) => {
                error!(code = %self.code, error = %e, "could not load session for timeout");
                self.deadline = Some(Instant::now() + self.turn_timeout);
                return;
            }
        };
        debug!(code = %self.code, seat = state.current_player, "turn timer fired");
        let notifications = state.expire_turn(&mut self.rng);
        if let Err(e) = self.commit(state, notifications, true) {
            error!(code = %self.code, error = %e, "could not save timeout resolution");
            self.deadline = Some(Instant::now() + self.turn_timeout);
        }
    }

    /// Save, then fan out. Nothing is sent if the save fails.
    fn commit(
        &mut self,
        state: GameState,
        notifications: Vec<Notification>,
        forced: bool,
    ) -> Result<(), SessionError> {
        self.store.save(&self.code, &state)?;
        for notification in &notifications {
            self.notifier
                .notify(&self.code, notification.audience, &notification.event);
        }
        self.rearm(&state, forced);

        if state.is_finished() {
            info!(code = %self.code, winner = ?state.winner(), "session finished");
            self.store.remove(&self.code);
            self.finished = true;
        }
        Ok(())
    }

    /// Arm a fresh deadline if the game now waits on something else
    fn rearm(&mut self, state: &GameState, force: bool) {
        let key = WaitKey::of(state);
        if key.is_none() {
            self.deadline = None;
        } else if force || key != self.waiting_on {
            self.deadline = Some(Instant::now() + self.turn_timeout);
        }
        self.waiting_on = key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use hexbound_core::{GameConfig, SetupPlacing};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(Audience, GameEvent)>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<GameEvent> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(_, event)| event.clone())
                .collect()
        }
    }

    impl Notifier for Recorder {
        fn notify(&self, _session: &str, audience: Audience, event: &GameEvent) {
            self.sent.lock().unwrap().push((audience, event.clone()));
        }
    }

    /// Memory store whose saves can be made to fail
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    impl SessionStore for FlakyStore {
        fn create(&self, state: &GameState) -> Result<String, StoreError> {
            self.inner.create(state)
        }

        fn load(&self, code: &str) -> Result<GameState, StoreError> {
            self.inner.load(code)
        }

        fn save(&self, code: &str, state: &GameState) -> Result<(), StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("disk on fire".into()));
            }
            self.inner.save(code, state)
        }

        fn remove(&self, code: &str) {
            self.inner.remove(code)
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn start(store: Arc<FlakyStore>) -> (SessionHandle, Arc<Recorder>) {
        let config = GameConfig {
            seats: 2,
            ..GameConfig::default()
        };
        let state = GameState::new(config, vec!["Alice".into(), "Bob".into()]).unwrap();
        let code = store.create(&state).unwrap();
        let recorder = Arc::new(Recorder::default());
        let handle = SessionHandle::spawn_with_rng(
            code,
            store,
            recorder.clone(),
            TIMEOUT,
            StdRng::seed_from_u64(7),
        );
        (handle, recorder)
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_and_notify() {
        let store = Arc::new(FlakyStore::default());
        let (handle, recorder) = start(store.clone());

        let position = handle.snapshot().await.unwrap().ledger.legal_initial_settlement_positions()[0];
        handle
            .apply(0, Command::PlaceInitialSettlement { position })
            .await
            .unwrap();

        let state = store.load(handle.code()).unwrap();
        assert_eq!(state.ledger.structures.len(), 1);
        assert!(recorder
            .events()
            .contains(&GameEvent::BuildSettlement { position, seat: 0 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_only_to_requester() {
        let store = Arc::new(FlakyStore::default());
        let (handle, recorder) = start(store.clone());
        let before = handle.snapshot().await.unwrap();

        let result = handle.apply(1, Command::RollDice).await;
        assert!(matches!(result, Err(SessionError::Rejected(_))));
        assert_eq!(handle.snapshot().await.unwrap(), before);
        // Only the opening ActionNeeded went out
        assert_eq!(recorder.events(), vec![GameEvent::ActionNeeded { turn: 0 }]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_discards_mutation() {
        let store = Arc::new(FlakyStore::default());
        let (handle, recorder) = start(store.clone());
        let before = handle.snapshot().await.unwrap();
        let position = before.ledger.legal_initial_settlement_positions()[0];

        store.failing.store(true, Ordering::SeqCst);
        let result = handle.apply(0, Command::PlaceInitialSettlement { position }).await;
        assert!(matches!(result, Err(SessionError::Store(_))));
        assert_eq!(handle.snapshot().await.unwrap(), before);
        assert_eq!(recorder.events().len(), 1);

        // Retry once the store is back
        store.failing.store(false, Ordering::SeqCst);
        handle
            .apply(0, Command::PlaceInitialSettlement { position })
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_timer_resolves_wait() {
        let store = Arc::new(FlakyStore::default());
        let (handle, recorder) = start(store.clone());
        handle.snapshot().await.unwrap();

        tokio::time::sleep(TIMEOUT + Duration::from_secs(1)).await;
        let state = handle.snapshot().await.unwrap();
        assert_eq!(state.ledger.structures.len(), 1);
        assert_eq!(
            state.phase,
            GamePhase::Setup {
                round: 1,
                placing: SetupPlacing::Road
            }
        );
        assert!(recorder
            .events()
            .iter()
            .any(|e| matches!(e, GameEvent::BuildSettlement { seat: 0, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_resets_timer() {
        let store = Arc::new(FlakyStore::default());
        let (handle, _) = start(store.clone());
        let position = handle.snapshot().await.unwrap().ledger.legal_initial_settlement_positions()[0];

        tokio::time::sleep(Duration::from_secs(20)).await;
        handle
            .apply(0, Command::PlaceInitialSettlement { position })
            .await
            .unwrap();

        // 40s after start but only 20s after the placement: the road is
        // still pending
        tokio::time::sleep(Duration::from_secs(20)).await;
        let state = handle.snapshot().await.unwrap();
        assert!(state.ledger.roads.is_empty());

        tokio::time::sleep(Duration::from_secs(11)).await;
        let state = handle.snapshot().await.unwrap();
        assert_eq!(state.ledger.roads.len(), 1);
        assert_eq!(state.current_player, 1);
    }
}
