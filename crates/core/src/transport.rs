//! The client side of the relay, independent of the web framework.

use crate::{error::TransportError, protocol::ServerMessage};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Text frames received from the client, in arrival order. The stream ends
/// when the client closes the connection.
pub type ClientStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Sends messages to the client. Implementations serialize concurrent callers.
#[async_trait]
pub trait ClientSink: Send + Sync {
    async fn send(&self, message: ServerMessage) -> Result<(), TransportError>;
}
