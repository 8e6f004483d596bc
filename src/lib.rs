//! Tank Arena Server Library
//!
//! Authoritative real-time simulation of a top-down multiplayer tank
//! arena, distributed to WebSocket clients as delta snapshots.

pub mod config;
pub mod util;
pub mod game;
pub mod net;
pub mod metrics;
