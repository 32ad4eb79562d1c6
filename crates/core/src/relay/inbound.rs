use crate::{
    codec::FrameCodec,
    error::SessionError,
    protocol::{Command, ControlMessage, ServerMessage},
    queue::QueueEntry,
    session::{SessionHandle, TaskExit},
    transport::{ClientSink, ClientStream},
    upstream::UpstreamSession,
};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Routes client messages: text straight upstream, audio through the queue.
pub struct InboundRelay {
    handle: SessionHandle,
    codec: FrameCodec,
    upstream: Arc<dyn UpstreamSession>,
    client: Arc<dyn ClientSink>,
}

impl InboundRelay {
    pub fn new(
        handle: SessionHandle,
        upstream: Arc<dyn UpstreamSession>,
        client: Arc<dyn ClientSink>,
    ) -> Self {
        let codec = FrameCodec::new(handle.config.inbound_sample_rate);
        Self {
            handle,
            codec,
            upstream,
            client,
        }
    }

    /// Consumes `incoming` until the client leaves, ends the session, or the
    /// session is shut down by another task.
    pub async fn run(self, mut incoming: ClientStream) -> Result<TaskExit, SessionError> {
        let active = self.handle.active.clone();
        while active.is_active() {
            let next = tokio::select! {
                biased;
                _ = active.cleared() => break,
                next = incoming.next() => next,
            };
            let Some(wire) = next else {
                info!("Client closed the connection.");
                return Ok(TaskExit::ClientDisconnected);
            };
            if let Some(exit) = self.route(self.codec.decode(&wire?)).await? {
                return Ok(exit);
            }
        }
        Ok(TaskExit::Cancelled)
    }

    async fn route(&self, message: ControlMessage) -> Result<Option<TaskExit>, SessionError> {
        match message {
            ControlMessage::TextTurn(text) => {
                debug!(chars = text.len(), "Forwarding text turn upstream.");
                self.upstream.send_text(&text, true).await?;
            }
            ControlMessage::Command(Command::EndSession) => {
                info!("Client requested the end of the session.");
                self.handle.active.deactivate();
                self.client.send(ServerMessage::session_ended()).await?;
                return Ok(Some(TaskExit::ClientEnded));
            }
            ControlMessage::AudioChunk(frame) if frame.is_empty() => {
                debug!("Skipping empty audio chunk.");
            }
            ControlMessage::AudioChunk(frame) => {
                self.handle.clock.mark_at(frame.received_at());
                let gain = self.handle.config.gain;
                let frame = if gain != 1.0 {
                    FrameCodec::apply_gain(&frame, gain)
                } else {
                    frame
                };
                let queue = &self.handle.queue;
                if queue.pending() >= queue.capacity() {
                    debug!(
                        bytes = frame.len(),
                        capacity = queue.capacity(),
                        "Audio queue full, waiting for the upstream sender."
                    );
                }
                let pushed = tokio::select! {
                    biased;
                    _ = self.handle.active.cleared() => return Ok(Some(TaskExit::Cancelled)),
                    pushed = queue.push(QueueEntry::Audio(frame)) => pushed,
                };
                if let Err(e) = pushed {
                    warn!(error = %e, "Dropping client audio.");
                    return Ok(Some(TaskExit::QueueClosed));
                }
            }
            // Barge-in is not wired to the upstream session yet.
            ControlMessage::Command(Command::Interrupt) => {
                debug!("Interrupt requested by client; nothing to do.");
            }
            ControlMessage::Command(Command::Other(name)) => {
                warn!(command = %name, "Ignoring unknown client command.");
            }
            ControlMessage::Malformed(reason) => {
                warn!(%reason, "Dropping malformed client message.");
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SessionConfig,
        error::TransportError,
        queue::{QueueConsumer, backpressure_queue},
        session::ActiveFlag,
        test_support::{
            FakeUpstream, RecordingSink, UpstreamCall, audio_message, channel_client,
            closing_client, open_client,
        },
    };
    use serde_json::json;

    fn session(config: SessionConfig) -> (SessionHandle, QueueConsumer) {
        let (producer, consumer) = backpressure_queue(config.queue_capacity);
        let handle = SessionHandle::new(ActiveFlag::new(), producer, Arc::new(config));
        (handle, consumer)
    }

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[tokio::test]
    async fn test_text_turn_goes_straight_upstream() {
        let (handle, _queue) = session(SessionConfig::default());
        let upstream = FakeUpstream::new(vec![]);
        let sink = RecordingSink::new();
        let relay = InboundRelay::new(handle, Arc::new(upstream.clone()), sink.clone());

        let exit = relay
            .run(closing_client(vec![json!({"text": "I built a compiler"}).to_string()]))
            .await
            .unwrap();

        assert_eq!(exit, TaskExit::ClientDisconnected);
        assert_eq!(
            upstream.calls(),
            vec![UpstreamCall::Text {
                text: "I built a compiler".to_string(),
                end_of_turn: true
            }]
        );
        assert!(sink.messages().is_empty());
    }

    #[tokio::test]
    async fn test_termination_keyword_ends_session() {
        let (handle, _queue) = session(SessionConfig::default());
        let active = handle.active.clone();
        let upstream = FakeUpstream::new(vec![]);
        let sink = RecordingSink::new();
        let relay = InboundRelay::new(handle, Arc::new(upstream.clone()), sink.clone());

        let exit = relay
            .run(closing_client(vec![
                json!({"text": "Q"}).to_string(),
                json!({"text": "never forwarded"}).to_string(),
            ]))
            .await
            .unwrap();

        assert_eq!(exit, TaskExit::ClientEnded);
        assert!(!active.is_active());
        assert_eq!(sink.json(), vec![json!({"command": "session_ended"})]);
        assert!(upstream.calls().is_empty());
    }

    #[tokio::test]
    async fn test_buffered_messages_are_ignored_after_cancel() {
        let (handle, mut queue) = session(SessionConfig::default());
        handle.active.deactivate();
        let upstream = FakeUpstream::new(vec![]);
        let relay = InboundRelay::new(handle, Arc::new(upstream.clone()), RecordingSink::new());

        let exit = relay
            .run(open_client(vec![
                json!({"text": "too late"}).to_string(),
                audio_message(&pcm(&[1, 2])),
            ]))
            .await
            .unwrap();

        assert_eq!(exit, TaskExit::Cancelled);
        assert!(upstream.calls().is_empty());
        assert!(queue.try_pop().is_none());
    }

    #[tokio::test]
    async fn test_audio_is_gained_and_queued() {
        let (handle, mut queue) = session(SessionConfig::default().with_gain(2.0));
        let upstream = FakeUpstream::new(vec![]);
        let relay = InboundRelay::new(handle, Arc::new(upstream.clone()), RecordingSink::new());

        relay
            .run(closing_client(vec![audio_message(&pcm(&[100, 30000]))]))
            .await
            .unwrap();

        match queue.try_pop() {
            Some(QueueEntry::Audio(frame)) => {
                assert_eq!(frame.data().as_ref(), pcm(&[200, 32767]).as_slice());
                assert_eq!(frame.mime_type(), "audio/pcm;rate=16000");
            }
            other => panic!("Expected queued audio, got {:?}", other),
        }
        // Audio never goes upstream directly.
        assert!(upstream.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_resets_silence_clock() {
        let (handle, _queue) = session(SessionConfig::default());
        let clock = handle.clock.clone();
        let relay = InboundRelay::new(handle, Arc::new(FakeUpstream::new(vec![])), RecordingSink::new());
        let (tx, incoming) = channel_client();
        let task = tokio::spawn(relay.run(incoming));

        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert!(clock.since_last_audio() >= std::time::Duration::from_secs(3));

        tx.send(Ok(audio_message(&pcm(&[1, 2])))).await.unwrap();
        drop(tx);
        task.await.unwrap().unwrap();
        assert_eq!(clock.since_last_audio(), std::time::Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_audio_is_neither_queued_nor_counted_as_speech() {
        let (handle, mut queue) = session(SessionConfig::default());
        let clock = handle.clock.clone();
        let relay = InboundRelay::new(handle, Arc::new(FakeUpstream::new(vec![])), RecordingSink::new());
        let (tx, incoming) = channel_client();
        let task = tokio::spawn(relay.run(incoming));

        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        tx.send(Ok(json!({"audio": ""}).to_string())).await.unwrap();
        drop(tx);

        assert_eq!(task.await.unwrap().unwrap(), TaskExit::ClientDisconnected);
        assert!(queue.try_pop().is_none());
        assert!(clock.since_last_audio() >= std::time::Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_holds_client_audio_back() {
        let (handle, mut queue) = session(SessionConfig {
            queue_capacity: 1,
            ..SessionConfig::default()
        });
        let producer = handle.queue.clone();
        let relay = InboundRelay::new(handle, Arc::new(FakeUpstream::new(vec![])), RecordingSink::new());
        let task = tokio::spawn(relay.run(closing_client(vec![
            audio_message(&pcm(&[1])),
            audio_message(&pcm(&[2])),
        ])));

        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert_eq!(producer.pending(), 1);
        assert!(!task.is_finished());

        for expected in [1i16, 2] {
            match queue.pop().await {
                Some(QueueEntry::Audio(frame)) => {
                    assert_eq!(frame.data().as_ref(), pcm(&[expected]).as_slice())
                }
                other => panic!("Expected queued audio, got {:?}", other),
            }
        }
        assert_eq!(task.await.unwrap().unwrap(), TaskExit::ClientDisconnected);
    }

    #[tokio::test]
    async fn test_malformed_and_inert_messages_are_skipped() {
        let (handle, _queue) = session(SessionConfig::default());
        let upstream = FakeUpstream::new(vec![]);
        let sink = RecordingSink::new();
        let relay = InboundRelay::new(handle, Arc::new(upstream.clone()), sink.clone());

        let exit = relay
            .run(closing_client(vec![
                "this is not json".to_string(),
                json!({"audio": "%%%"}).to_string(),
                json!({"command": "interrupt"}).to_string(),
                json!({"command": "dance"}).to_string(),
                json!({"text": "still here"}).to_string(),
            ]))
            .await
            .unwrap();

        assert_eq!(exit, TaskExit::ClientDisconnected);
        assert_eq!(
            upstream.calls(),
            vec![UpstreamCall::Text {
                text: "still here".to_string(),
                end_of_turn: true
            }]
        );
        assert!(sink.messages().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_is_fatal() {
        let (handle, _queue) = session(SessionConfig::default());
        let relay = InboundRelay::new(handle, Arc::new(FakeUpstream::new(vec![])), RecordingSink::new());
        let (tx, incoming) = channel_client();
        tx.send(Err(TransportError::Io("reset by peer".into())))
            .await
            .unwrap();

        let err = relay.run(incoming).await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
    }

    #[tokio::test]
    async fn test_upstream_failure_on_text_is_fatal() {
        let (handle, _queue) = session(SessionConfig::default());
        let upstream = FakeUpstream::new(vec![]);
        upstream.fail_text_sends();
        let relay = InboundRelay::new(handle, Arc::new(upstream), RecordingSink::new());

        let err = relay
            .run(closing_client(vec![json!({"text": "hello"}).to_string()]))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_stops_when_session_is_cancelled() {
        let (handle, _queue) = session(SessionConfig::default());
        let active = handle.active.clone();
        let relay = InboundRelay::new(handle, Arc::new(FakeUpstream::new(vec![])), RecordingSink::new());
        let (_tx, incoming) = channel_client();

        let task = tokio::spawn(relay.run(incoming));
        active.deactivate();
        assert_eq!(task.await.unwrap().unwrap(), TaskExit::Cancelled);
    }
}
