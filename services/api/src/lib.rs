//! Interviewer API Library Crate
//!
//! The web service around the interview relay: configuration, document
//! uploads, prompt preparation, the WebSocket endpoint and routing. The `api`
//! binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod interview;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
