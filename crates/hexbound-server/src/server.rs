//! WebSocket server and connection handling.

use crate::auth::SeatAuthenticator;
use crate::config::ServerConfig;
use crate::lobby::{Lobby, Seating};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::{Notifier, SessionError, SessionHandle};
use crate::store::{MemoryStore, SessionStore};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use hexbound_core::{Audience, Command, GameEvent, Seat};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Open connections and the seats they are attached to.
#[derive(Default)]
pub struct Connections {
    /// Mapping from connection ID to its message sender
    senders: DashMap<Uuid, mpsc::UnboundedSender<ServerMessage>>,
    /// Mapping from (session, seat) to the attached connection
    seats: DashMap<(String, Seat), Uuid>,
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection: Uuid, sender: mpsc::UnboundedSender<ServerMessage>) {
        self.senders.insert(connection, sender);
    }

    /// Bind a connection to a seat, replacing any earlier connection
    pub fn attach(&self, connection: Uuid, session: &str, seat: Seat) {
        self.seats.insert((session.to_string(), seat), connection);
    }

    /// Unbind `seat` if it still points at `connection`
    pub fn detach(&self, connection: Uuid, session: &str, seat: Seat) {
        self.seats
            .remove_if(&(session.to_string(), seat), |_, bound| *bound == connection);
    }

    /// Whether any connection is attached to `session`
    pub fn has_session(&self, session: &str) -> bool {
        self.seats.iter().any(|entry| entry.key().0 == session)
    }

    /// Drop a connection and every seat binding pointing at it
    pub fn remove(&self, connection: Uuid) {
        self.senders.remove(&connection);
        self.seats.retain(|_, bound| *bound != connection);
    }

    /// Send a message to a specific connection.
    pub fn send(&self, connection: Uuid, msg: ServerMessage) {
        if let Some(sender) = self.senders.get(&connection) {
            let _ = sender.send(msg);
        }
    }

    /// Send a message to the connections attached to `session` that are in
    /// the audience.
    pub fn send_to_session(&self, session: &str, audience: Audience, msg: ServerMessage) {
        let targets: Vec<Uuid> = self
            .seats
            .iter()
            .filter(|entry| entry.key().0 == session && audience.includes(entry.key().1))
            .map(|entry| *entry.value())
            .collect();
        for connection in targets {
            self.send(connection, msg.clone());
        }
    }
}

impl Notifier for Connections {
    fn notify(&self, session: &str, audience: Audience, event: &GameEvent) {
        self.send_to_session(session, audience, ServerMessage::Event { event: event.clone() });
    }
}

/// Server state shared across all connections.
pub struct ServerState {
    pub config: ServerConfig,
    pub store: Arc<dyn SessionStore>,
    pub lobby: Lobby,
    pub auth: SeatAuthenticator,
    /// Actor handles of started sessions
    pub sessions: DashMap<String, SessionHandle>,
    pub connections: Arc<Connections>,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: ServerConfig, store: Arc<dyn SessionStore>) -> Self {
        Self {
            lobby: Lobby::new(store.clone(), config.game_config()),
            auth: SeatAuthenticator::new(&config.token_secret),
            sessions: DashMap::new(),
            connections: Arc::new(Connections::new()),
            store,
            config,
        }
    }

    fn session(&self, code: &str) -> Option<SessionHandle> {
        // Clone out of the map so no guard is held across an await
        let handle = self.sessions.get(code).map(|entry| entry.value().clone())?;
        if handle.is_closed() {
            self.sessions.remove(code);
            return None;
        }
        Some(handle)
    }

    /// Spawn the actor for a session whose seats are all taken
    fn start_session(&self, code: &str) {
        let handle = SessionHandle::spawn(
            code.to_string(),
            self.store.clone(),
            self.connections.clone(),
            self.config.turn_timeout,
        );
        self.sessions.insert(code.to_string(), handle);
    }
}

/// Run the WebSocket server.
pub async fn run_server(state: Arc<ServerState>) -> anyhow::Result<()> {
    let addr = state.config.addr;
    let listener = TcpListener::bind(addr).await?;
    info!("Hexbound server listening on {}", addr);

    while let Ok((stream, peer_addr)) = listener.accept().await {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }

    Ok(())
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New WebSocket connection from {}", addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let connection_id = Uuid::new_v4();

    // Create channel for outgoing messages
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    state.connections.register(connection_id, tx);

    let welcome = ServerMessage::Welcome { connection_id };
    ws_sender
        .send(Message::Text(serde_json::to_string(&welcome)?))
        .await?;

    // Spawn task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    });

    let mut client = Client {
        id: connection_id,
        seat: None,
    };

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => handle_message(&mut client, client_msg, &state).await,
                Err(e) => {
                    warn!("Invalid message from {}: {}", connection_id, e);
                    state
                        .connections
                        .send(connection_id, ServerMessage::error(format!("Invalid message: {}", e)));
                }
            },
            Ok(Message::Close(_)) => {
                info!("Client {} closing connection", connection_id);
                break;
            }
            Err(e) => {
                error!("WebSocket error from {}: {}", connection_id, e);
                break;
            }
            _ => {}
        }
    }

    disconnect(&client, &state);
    send_task.abort();

    info!("Connection closed for {}", connection_id);
    Ok(())
}

/// Per-connection state
struct Client {
    id: Uuid,
    /// Session code and seat this connection acts for
    seat: Option<(String, Seat)>,
}

/// Seats stay taken and the player can attach again with their token. A
/// session still waiting for players is dropped once nobody is attached.
fn disconnect(client: &Client, state: &ServerState) {
    state.connections.remove(client.id);
    if let Some((code, _)) = &client.seat {
        if state.lobby.is_waiting(code) && !state.connections.has_session(code) {
            state.lobby.abandon(code);
        }
    }
}

/// Handle a client message.
async fn handle_message(client: &mut Client, msg: ClientMessage, state: &Arc<ServerState>) {
    let reply = |msg: ServerMessage| state.connections.send(client.id, msg);

    match msg {
        ClientMessage::CreateSession { .. } | ClientMessage::JoinSession { .. }
            if client.seat.is_some() =>
        {
            reply(ServerMessage::error("Already seated in a session"));
        }

        ClientMessage::CreateSession { name } => match state.lobby.create(name) {
            Ok(seating) => seat_client(client, seating, state),
            Err(e) => reply(ServerMessage::error(e.to_string())),
        },

        ClientMessage::JoinSession { code, name } => match state.lobby.join(&code, name) {
            Ok(seating) => seat_client(client, seating, state),
            Err(e) => reply(ServerMessage::error(e.to_string())),
        },

        ClientMessage::Attach { token } => {
            let (code, seat) = match state.auth.authenticate(&token) {
                Ok(claims) => claims,
                Err(e) => {
                    warn!("Rejected token from {}: {}", client.id, e);
                    reply(ServerMessage::error(e.to_string()));
                    return;
                }
            };
            if state.session(&code).is_none() && !state.lobby.is_waiting(&code) {
                reply(ServerMessage::error(format!("Session {} is over", code)));
                return;
            }
            if let Some((old_code, old_seat)) = &client.seat {
                state.connections.detach(client.id, old_code, *old_seat);
            }
            state.connections.attach(client.id, &code, seat);
            info!(%code, seat, "connection {} attached", client.id);
            reply(ServerMessage::Attached {
                code: code.clone(),
                seat,
            });
            client.seat = Some((code, seat));
        }

        ClientMessage::Command { command } => {
            let Some((code, seat)) = client.seat.clone() else {
                reply(ServerMessage::error("Not seated in a session"));
                return;
            };
            run_command(client.id, &code, seat, command, state).await;
        }

        ClientMessage::Snapshot => {
            let Some((code, seat)) = client.seat.clone() else {
                reply(ServerMessage::error("Not seated in a session"));
                return;
            };
            let snapshot = match state.session(&code) {
                Some(handle) => handle.snapshot().await,
                None => state.store.load(&code).map_err(SessionError::from),
            };
            match snapshot {
                Ok(game) => reply(ServerMessage::Snapshot {
                    view: game.view_for(seat),
                }),
                Err(e) => reply(ServerMessage::error(e.to_string())),
            }
        }

        ClientMessage::Ping => reply(ServerMessage::Pong),
    }
}

/// Bind the client to its new seat and tell the table
fn seat_client(client: &mut Client, seating: Seating, state: &Arc<ServerState>) {
    let Seating {
        code,
        seat,
        players,
        full,
    } = seating;

    let token = match state.auth.issue(&code, seat) {
        Ok(token) => token,
        Err(e) => {
            error!(%code, seat, "could not issue seat token: {}", e);
            state
                .connections
                .send(client.id, ServerMessage::error("Could not issue seat token"));
            return;
        }
    };
    state.connections.attach(client.id, &code, seat);
    state.connections.send(
        client.id,
        ServerMessage::Seated {
            code: code.clone(),
            seat,
            token,
        },
    );
    state.connections.send_to_session(
        &code,
        Audience::Broadcast,
        ServerMessage::LobbyUpdated {
            code: code.clone(),
            players,
            seats: state.lobby.seats(),
        },
    );

    if full {
        match state.store.load(&code) {
            Ok(game) => {
                for player in &game.players {
                    state.connections.send_to_session(
                        &code,
                        Audience::Seat(player.seat),
                        ServerMessage::SessionStarted {
                            view: game.view_for(player.seat),
                        },
                    );
                }
                state.start_session(&code);
            }
            Err(e) => error!(%code, "could not start session: {}", e),
        }
    }
    client.seat = Some((code, seat));
}

async fn run_command(connection: Uuid, code: &str, seat: Seat, command: Command, state: &Arc<ServerState>) {
    let Some(handle) = state.session(code) else {
        state
            .connections
            .send(connection, ServerMessage::error("Session has not started"));
        return;
    };

    match handle.apply(seat, command).await {
        // Events reach every seat, the requester included, via the notifier
        Ok(()) => {}
        Err(SessionError::Rejected(error)) => {
            let message = error.to_string();
            state
                .connections
                .send(connection, ServerMessage::CommandRejected { error, message });
        }
        Err(SessionError::Store(e)) => {
            error!(%code, "store failure: {}", e);
            state
                .connections
                .send(connection, ServerMessage::error("Temporary failure, try again"));
        }
        Err(SessionError::Unavailable) => {
            state.sessions.remove(code);
            state
                .connections
                .send(connection, ServerMessage::error("Session is over"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state(seats: &str) -> Arc<ServerState> {
        let config = ServerConfig::from_lookup(|key| match key {
            "HEXBOUND_SEATS" => Some(seats.to_string()),
            "HEXBOUND_TOKEN_SECRET" => Some("test-secret".to_string()),
            _ => None,
        })
        .unwrap();
        Arc::new(ServerState::new(config))
    }

    fn connect(state: &ServerState) -> (Client, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Client {
            id: Uuid::new_v4(),
            seat: None,
        };
        state.connections.register(client.id, tx);
        (client, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    async fn create(state: &Arc<ServerState>, client: &mut Client, name: &str) -> String {
        let msg = ClientMessage::CreateSession { name: name.into() };
        handle_message(client, msg, state).await;
        client.seat.clone().map(|(code, _)| code).unwrap()
    }

    async fn join(state: &Arc<ServerState>, client: &mut Client, code: &str, name: &str) {
        let msg = ClientMessage::JoinSession {
            code: code.into(),
            name: name.into(),
        };
        handle_message(client, msg, state).await;
    }

    #[tokio::test]
    async fn test_seated_connection_cannot_take_another_seat() {
        let state = test_state("3");
        let (mut host, mut host_rx) = connect(&state);
        let code = create(&state, &mut host, "Host").await;
        assert!(matches!(
            drain(&mut host_rx).first(),
            Some(ServerMessage::Seated { seat: 0, .. })
        ));

        create(&state, &mut host, "Again").await;
        join(&state, &mut host, &code, "Again").await;
        let replies = drain(&mut host_rx);
        assert_eq!(replies.len(), 2);
        assert!(replies
            .iter()
            .all(|msg| matches!(msg, ServerMessage::Error { .. })));

        assert_eq!(host.seat, Some((code.clone(), 0)));
        assert_eq!(state.connections.seats.len(), 1);
        // The second seat was never handed out
        let (mut guest, _guest_rx) = connect(&state);
        join(&state, &mut guest, &code, "Guest").await;
        assert_eq!(guest.seat, Some((code, 1)));
    }

    #[tokio::test]
    async fn test_last_disconnect_abandons_waiting_session() {
        let state = test_state("3");
        let (mut host, _host_rx) = connect(&state);
        let (mut guest, _guest_rx) = connect(&state);
        let code = create(&state, &mut host, "Host").await;
        join(&state, &mut guest, &code, "Guest").await;

        disconnect(&host, &state);
        assert!(state.lobby.is_waiting(&code));
        assert!(state.store.load(&code).is_ok());

        disconnect(&guest, &state);
        assert!(!state.lobby.is_waiting(&code));
        assert!(state.store.load(&code).is_err());
    }

    #[tokio::test]
    async fn test_started_session_sends_each_seat_its_own_view() {
        let state = test_state("2");
        let (mut host, mut host_rx) = connect(&state);
        let (mut guest, mut guest_rx) = connect(&state);
        let code = create(&state, &mut host, "Host").await;
        join(&state, &mut guest, &code, "Guest").await;

        let seat_of_view = |messages: Vec<ServerMessage>| {
            messages.into_iter().find_map(|msg| match msg {
                ServerMessage::SessionStarted { view } => Some(view.seat),
                _ => None,
            })
        };
        assert_eq!(seat_of_view(drain(&mut host_rx)), Some(0));
        assert_eq!(seat_of_view(drain(&mut guest_rx)), Some(1));

        handle_message(&mut guest, ClientMessage::Snapshot, &state).await;
        let view = drain(&mut guest_rx)
            .into_iter()
            .find_map(|msg| match msg {
                ServerMessage::Snapshot { view } => Some(view),
                _ => None,
            })
            .unwrap();
        assert_eq!(view.seat, 1);
        assert_eq!(view.hidden.len(), 1);
        assert_eq!(view.hidden[0].seat, 0);
        assert!(view.state.players[0].dev_cards.is_empty());

        // Started sessions outlive their connections
        disconnect(&host, &state);
        disconnect(&guest, &state);
        assert!(state.store.load(&code).is_ok());
    }

    #[test]
    fn test_session_fan_out_respects_audience() {
        let connections = Connections::new();
        let mut receivers = Vec::new();
        for seat in 0..3u8 {
            let (tx, rx) = mpsc::unbounded_channel();
            let id = Uuid::new_v4();
            connections.register(id, tx);
            connections.attach(id, "ABCDEFG", seat);
            receivers.push(rx);
        }

        connections.notify("ABCDEFG", Audience::AllExcept(1), &GameEvent::ActionNeeded { turn: 0 });
        connections.notify("OTHER12", Audience::Broadcast, &GameEvent::ActionNeeded { turn: 0 });

        assert!(receivers[0].try_recv().is_ok());
        assert!(receivers[1].try_recv().is_err());
        assert!(receivers[2].try_recv().is_ok());
        assert!(receivers[2].try_recv().is_err());
    }

    #[test]
    fn test_reattach_replaces_connection() {
        let connections = Connections::new();
        let (old_tx, mut old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();
        connections.register(old, old_tx);
        connections.register(new, new_tx);

        connections.attach(old, "ABCDEFG", 0);
        connections.attach(new, "ABCDEFG", 0);
        connections.remove(old);
        connections.send_to_session("ABCDEFG", Audience::Seat(0), ServerMessage::Pong);

        assert!(old_rx.try_recv().is_err());
        assert!(matches!(new_rx.try_recv(), Ok(ServerMessage::Pong)));
    }
}
