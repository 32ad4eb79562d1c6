//! Gemini Live provider for the interview relay.
//!
//! Implements [`interviewer_core::UpstreamConnector`] and
//! [`interviewer_core::UpstreamSession`] over the `BidiGenerateContent`
//! WebSocket API.

pub mod config;
pub mod session;
pub mod types;

pub use config::GeminiConfig;
pub use session::{GeminiConnector, GeminiSession};
