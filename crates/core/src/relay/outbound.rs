use crate::{
    codec::FrameCodec,
    error::{SessionError, UpstreamError},
    frame::ResponseEvent,
    protocol::ServerMessage,
    queue::{QueueConsumer, QueueEntry},
    session::{ActiveFlag, TaskExit},
    transport::ClientSink,
    upstream::{TurnStream, UpstreamSession},
};
use futures::StreamExt;
use std::sync::Arc;
use tracing::debug;

/// Drains the audio queue into the upstream session.
pub struct UpstreamSender {
    active: ActiveFlag,
    queue: QueueConsumer,
    upstream: Arc<dyn UpstreamSession>,
}

impl UpstreamSender {
    pub fn new(active: ActiveFlag, queue: QueueConsumer, upstream: Arc<dyn UpstreamSession>) -> Self {
        Self {
            active,
            queue,
            upstream,
        }
    }

    pub async fn run(self) -> Result<TaskExit, SessionError> {
        let Self {
            active,
            mut queue,
            upstream,
        } = self;
        loop {
            let entry = tokio::select! {
                biased;
                _ = active.cleared() => return Ok(TaskExit::Cancelled),
                entry = queue.pop() => entry,
            };
            match entry {
                Some(QueueEntry::Audio(frame)) => upstream.send_audio(&frame).await?,
                Some(QueueEntry::StreamEnd) => {
                    debug!("Signalling end of the audio stream upstream.");
                    upstream.signal_audio_stream_end().await?;
                }
                None => return Ok(TaskExit::QueueClosed),
            }
        }
    }
}

/// Streams upstream turns back to the client, one turn at a time.
pub struct ClientForwarder {
    active: ActiveFlag,
    upstream: Arc<dyn UpstreamSession>,
    client: Arc<dyn ClientSink>,
}

impl ClientForwarder {
    pub fn new(
        active: ActiveFlag,
        upstream: Arc<dyn UpstreamSession>,
        client: Arc<dyn ClientSink>,
    ) -> Self {
        Self {
            active,
            upstream,
            client,
        }
    }

    pub async fn run(self) -> Result<TaskExit, SessionError> {
        while self.active.is_active() {
            let turn = tokio::select! {
                biased;
                _ = self.active.cleared() => break,
                turn = self.upstream.receive() => turn?,
            };
            if !self.forward_turn(turn).await? || !self.active.is_active() {
                break;
            }
            self.client.send(ServerMessage::turn_complete()).await?;
            debug!("Turn complete sent to client.");
        }
        Ok(TaskExit::Cancelled)
    }

    /// Forwards one turn. `Ok(false)` means the session was shut down mid-turn.
    async fn forward_turn(&self, mut turn: TurnStream<'_>) -> Result<bool, SessionError> {
        let mut saw_event = false;
        loop {
            let event = tokio::select! {
                biased;
                _ = self.active.cleared() => return Ok(false),
                event = turn.next() => event,
            };
            match event {
                Some(Ok(ResponseEvent::TurnComplete)) => return Ok(true),
                Some(Ok(event)) => {
                    saw_event = true;
                    if let Some(message) = FrameCodec::encode(&event) {
                        self.client.send(message).await?;
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None if saw_event => return Ok(true),
                // An empty turn means the upstream stream is gone for good.
                None => return Err(UpstreamError::Closed.into()),
            }
        }
    }
}
