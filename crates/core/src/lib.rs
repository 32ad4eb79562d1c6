//! Interviewer Core
//!
//! The streaming session relay behind the interviewer service. This crate is
//! transport-agnostic: it knows how to move audio and text between a client
//! connection and an upstream real-time conversational session, but not how
//! either side is wired. The WebSocket service and the provider crate plug in
//! through the traits in `transport` and `upstream`.
//!
//! - `codec`: wire decoding, response encoding and PCM gain.
//! - `queue`: the bounded outbound audio queue.
//! - `silence`: end-of-speech detection by silence timing.
//! - `relay`: the inbound and outbound relay tasks.
//! - `supervisor`: per-connection lifecycle and shutdown coordination.

pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod interview;
pub mod protocol;
pub mod queue;
pub mod relay;
pub mod session;
pub mod silence;
pub mod supervisor;
pub mod transport;
pub mod upstream;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::SessionConfig;
pub use error::{SessionError, TransportError, UpstreamError};
pub use frame::{AudioFrame, ResponseEvent};
pub use interview::{Documents, InterviewPreparer, SessionRequest};
pub use protocol::{ControlMessage, ServerMessage};
pub use supervisor::{EndReason, SessionPhase, SessionReport, SessionSupervisor};
pub use transport::{ClientSink, ClientStream};
pub use upstream::{TurnStream, UpstreamConnector, UpstreamSession};
