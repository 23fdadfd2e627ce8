//! Hexbound multiplayer server.
//!
//! This crate hosts sessions of the Hexbound rules engine:
//! - [`store`]: session snapshots
//! - [`auth`]: seat tokens
//! - [`lobby`]: creating and joining sessions
//! - [`session`]: one actor per running session, with the turn timer
//! - [`server`]: WebSocket transport and event fan-out
//! - [`protocol`]: client and server messages
//! - [`config`]: settings from the environment

pub mod auth;
pub mod config;
pub mod lobby;
pub mod protocol;
pub mod server;
pub mod session;
pub mod store;

pub use config::ServerConfig;
pub use server::{run_server, ServerState};
