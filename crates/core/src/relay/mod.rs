//! The relay tasks that move traffic while a session is active.
//!
//! - `inbound`: client messages into the upstream session or the audio queue.
//! - `outbound`: the audio queue into the upstream session, and upstream turns
//!   back to the client.

mod inbound;
mod outbound;

pub use inbound::InboundRelay;
pub use outbound::{ClientForwarder, UpstreamSender};
