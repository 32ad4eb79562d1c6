//! WebSocket Interview Sessions
//!
//! Adapts an axum WebSocket to the relay's client traits and hands the
//! connection to a `SessionSupervisor`.

pub mod session;

pub use session::ws_handler;
