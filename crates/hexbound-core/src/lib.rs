//! Hexbound - rules engine for a hex-board settlement game
//!
//! This crate provides the core game logic for Hexbound, including:
//! - Offset-row addressing for tiles, intersections and edges
//! - Board generation with resources, production numbers and ports
//! - Player hands, development cards and port privileges
//! - Structure and road ledger with placement rules
//! - Longest road computation
//! - Turn controller with full rule enforcement
//!
//! # Architecture
//!
//! The engine is transport-agnostic: `GameState` takes a seat and a
//! `Command` and returns addressed `Notification`s, or a `GameError` leaving
//! the state unchanged. Everything is serde-serializable so the server can
//! snapshot a session between commands.
//!
//! # Modules
//!
//! - [`grid`]: Tile, intersection and edge coordinates
//! - [`board`]: Board representation and generation
//! - [`player`]: Player state and resources
//! - [`ledger`]: Placed structures and roads
//! - [`roads`]: Longest road
//! - [`production`]: Dice, production and bank trades
//! - [`actions`]: Commands, events and audiences
//! - [`game`]: Game state machine

pub mod actions;
pub mod board;
pub mod game;
pub mod grid;
pub mod ledger;
pub mod player;
pub mod production;
pub mod roads;

// Re-export commonly used types
pub use actions::{Audience, CardPlay, Command, GameEvent, Notification, TradeOffer};
pub use board::{Board, PortKind, Resource, Seat, Tile, TileKind};
pub use game::{
    GameConfig, GameError, GamePhase, GameState, HiddenHand, IllegalAction, RobberStage, SeatView,
    SetupPlacing,
};
pub use grid::{Edge, Intersection, TileCoord, TopologyError};
pub use ledger::{Ledger, Structure, StructureKind};
pub use player::{DevelopmentCard, Player, ResourceHand, TradePrivileges};
