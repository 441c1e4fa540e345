//! Tutor API Library Crate
//!
//! Everything behind the tutoring web service: configuration, shared state,
//! the PostgreSQL assessment cache, REST handlers, the WebSocket session
//! host and routing. The `api` binary is a thin wrapper around this library.

pub mod audio_utils;
pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
