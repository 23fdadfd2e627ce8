//! WebSocket protocol messages for Hexbound multiplayer.

use hexbound_core::{Command, GameError, GameEvent, Seat, SeatView};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    /// Create a new session and take seat 0
    CreateSession { name: String },

    /// Take the next free seat of a waiting session
    JoinSession { code: String, name: String },

    /// Bind this connection to the seat named by a token
    Attach { token: String },

    /// Submit a game command for the attached seat
    Command { command: Command },

    /// Request the current game state
    Snapshot,

    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Welcome message with the connection ID
    Welcome { connection_id: Uuid },

    /// Seat taken in a session; keep the token to reconnect
    Seated {
        code: String,
        seat: Seat,
        token: String,
    },

    /// Connection bound to a seat again
    Attached { code: String, seat: Seat },

    /// Seats filled so far in a waiting session
    LobbyUpdated {
        code: String,
        players: Vec<String>,
        seats: u8,
    },

    /// Every seat is taken and setup begins
    SessionStarted { view: SeatView },

    /// Something happened in the game
    Event { event: GameEvent },

    /// A command was refused; nothing changed
    CommandRejected { error: GameError, message: String },

    /// Current game state as the requesting seat sees it
    Snapshot { view: SeatView },

    /// Error occurred
    Error { message: String },

    /// Pong response
    Pong,
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_format() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"Command","payload":{"command":{"type":"RollDice"}}}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Command {
                command: Command::RollDice
            }
        ));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"Ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_server_message_format() {
        let json = serde_json::to_value(ServerMessage::Event {
            event: GameEvent::ActionNeeded { turn: 1 },
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "Event",
                "payload": {"event": {"event": "ActionNeeded", "payload": {"turn": 1}}}
            })
        );
    }
}
