//! The upstream conversational session, as seen by the relay.

use crate::{
    error::UpstreamError,
    frame::{AudioFrame, ResponseEvent},
};
use async_trait::async_trait;
use futures::Stream;
use std::{pin::Pin, sync::Arc};
use tracing::{info, warn};

/// The events of one upstream turn. A fresh stream is requested per turn; it
/// ends after [`ResponseEvent::TurnComplete`].
pub type TurnStream<'a> =
    Pin<Box<dyn Stream<Item = Result<ResponseEvent, UpstreamError>> + Send + 'a>>;

/// A live connection to the remote conversational model.
///
/// Every method takes `&self`: the inbound relay, the upstream sender and the
/// client forwarder all use the same session concurrently.
#[async_trait]
pub trait UpstreamSession: Send + Sync {
    /// Sends a text turn. With `end_of_turn` the model starts answering.
    async fn send_text(&self, text: &str, end_of_turn: bool) -> Result<(), UpstreamError>;

    /// Sends one chunk of realtime audio.
    async fn send_audio(&self, frame: &AudioFrame) -> Result<(), UpstreamError>;

    /// Tells the model the audio stream has paused.
    async fn signal_audio_stream_end(&self) -> Result<(), UpstreamError>;

    /// Starts reading the next turn.
    async fn receive<'a>(&'a self) -> Result<TurnStream<'a>, UpstreamError>;

    /// Closes the connection. Called once, by [`UpstreamLease::release`].
    async fn close(&self) -> Result<(), UpstreamError>;
}

/// Opens upstream sessions.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn UpstreamSession>, UpstreamError>;
}

/// Scoped ownership of an upstream session.
///
/// The supervisor releases the lease explicitly on every normal and error
/// path. If the lease is dropped without that (a panic, or the session future
/// being cancelled), the close is scheduled on the current runtime instead.
pub struct UpstreamLease {
    session: Arc<dyn UpstreamSession>,
    released: bool,
}

impl UpstreamLease {
    pub async fn acquire(connector: &dyn UpstreamConnector) -> Result<Self, UpstreamError> {
        let session = connector.connect().await?;
        info!("Upstream session established.");
        Ok(Self {
            session,
            released: false,
        })
    }

    /// The leased session. Must not be used after [`UpstreamLease::release`].
    pub fn session(&self) -> Arc<dyn UpstreamSession> {
        self.session.clone()
    }

    /// Closes the session. Consumes the lease, so it happens at most once.
    pub async fn release(mut self) {
        self.released = true;
        if let Err(e) = self.session.close().await {
            warn!(error = %e, "Upstream session did not close cleanly.");
        }
        info!("Upstream session released.");
    }
}

impl Drop for UpstreamLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!("Upstream lease dropped without release; closing in the background.");
        let session = self.session.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        warn!(error = %e, "Background upstream close failed.");
                    }
                });
            }
            Err(_) => warn!("No runtime available to close the upstream session."),
        }
    }
}
