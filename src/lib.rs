//! Card Duel Server - authoritative round server for two-player card duels
//!
//! The library holds everything the binary wires together:
//! - `game`: card catalog, combat resolution and the round state machine
//! - `lobby`: pairs connections into matches
//! - `ws` and `http`: the client-facing transport
//! - `config` and `app`: environment configuration and shared state

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod lobby;
pub mod util;
pub mod ws;
