//! In-memory stand-ins for the upstream session and the client connection.

use crate::{
    error::{TransportError, UpstreamError},
    frame::{AudioFrame, ResponseEvent},
    protocol::ServerMessage,
    session::ActiveFlag,
    transport::{ClientSink, ClientStream},
    upstream::{TurnStream, UpstreamConnector, UpstreamSession},
};
use async_trait::async_trait;
use futures::StreamExt;
use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// What the relay asked the fake upstream to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamCall {
    Text { text: String, end_of_turn: bool },
    Audio(Vec<u8>),
    StreamEnd,
}

type Turn = Vec<Result<ResponseEvent, UpstreamError>>;

struct FakeUpstreamInner {
    turns: Mutex<VecDeque<Turn>>,
    calls: Mutex<Vec<UpstreamCall>>,
    closes: AtomicUsize,
    close_when_exhausted: bool,
    fail_text: AtomicBool,
    fail_audio: AtomicBool,
}

/// Scripted upstream: replays `turns` one per `receive`, records every call.
///
/// Once the script runs out, `receive` either waits forever (an idle model) or
/// fails with [`UpstreamError::Closed`].
#[derive(Clone)]
pub struct FakeUpstream {
    inner: Arc<FakeUpstreamInner>,
}

impl FakeUpstream {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self::build(turns, false)
    }

    pub fn closing_after(turns: Vec<Turn>) -> Self {
        Self::build(turns, true)
    }

    fn build(turns: Vec<Turn>, close_when_exhausted: bool) -> Self {
        Self {
            inner: Arc::new(FakeUpstreamInner {
                turns: Mutex::new(turns.into()),
                calls: Mutex::new(Vec::new()),
                closes: AtomicUsize::new(0),
                close_when_exhausted,
                fail_text: AtomicBool::new(false),
                fail_audio: AtomicBool::new(false),
            }),
        }
    }

    pub fn fail_text_sends(&self) {
        self.inner.fail_text.store(true, Ordering::SeqCst);
    }

    pub fn fail_audio_sends(&self) {
        self.inner.fail_audio.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<UpstreamCall> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn stream_end_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == UpstreamCall::StreamEnd)
            .count()
    }

    pub fn close_count(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    fn record(&self, call: UpstreamCall) {
        self.inner.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl UpstreamSession for FakeUpstream {
    async fn send_text(&self, text: &str, end_of_turn: bool) -> Result<(), UpstreamError> {
        if self.inner.fail_text.load(Ordering::SeqCst) {
            return Err(UpstreamError::Send("scripted text failure".into()));
        }
        self.record(UpstreamCall::Text {
            text: text.to_string(),
            end_of_turn,
        });
        Ok(())
    }

    async fn send_audio(&self, frame: &AudioFrame) -> Result<(), UpstreamError> {
        if self.inner.fail_audio.load(Ordering::SeqCst) {
            return Err(UpstreamError::Send("scripted audio failure".into()));
        }
        self.record(UpstreamCall::Audio(frame.data().to_vec()));
        Ok(())
    }

    async fn signal_audio_stream_end(&self) -> Result<(), UpstreamError> {
        self.record(UpstreamCall::StreamEnd);
        Ok(())
    }

    async fn receive<'a>(&'a self) -> Result<TurnStream<'a>, UpstreamError> {
        let next = self.inner.turns.lock().unwrap().pop_front();
        match next {
            Some(turn) => Ok(futures::stream::iter(turn).boxed()),
            None if self.inner.close_when_exhausted => Err(UpstreamError::Closed),
            None => futures::future::pending().await,
        }
    }

    async fn close(&self) -> Result<(), UpstreamError> {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeConnector {
    upstream: Option<FakeUpstream>,
    error: Option<String>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new(upstream: FakeUpstream) -> Self {
        Self {
            upstream: Some(upstream),
            error: None,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            upstream: None,
            error: Some(reason.to_string()),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamConnector for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn UpstreamSession>, UpstreamError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match (&self.upstream, &self.error) {
            (Some(upstream), _) => Ok(Arc::new(upstream.clone())),
            (None, Some(reason)) => Err(UpstreamError::Connect(reason.clone())),
            (None, None) => Err(UpstreamError::Closed),
        }
    }
}

/// Client sink that keeps everything it was asked to send.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<ServerMessage>>,
    broken: AtomicBool,
    shuts_down: Option<ActiveFlag>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn broken() -> Arc<Self> {
        let sink = Self::default();
        sink.broken.store(true, Ordering::SeqCst);
        Arc::new(sink)
    }

    /// A sink that shuts the session down as it accepts its first message.
    pub fn deactivating(active: ActiveFlag) -> Arc<Self> {
        Arc::new(Self {
            shuts_down: Some(active),
            ..Self::default()
        })
    }

    pub fn messages(&self) -> Vec<ServerMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn json(&self) -> Vec<serde_json::Value> {
        self.messages()
            .iter()
            .map(|msg| serde_json::to_value(msg).unwrap())
            .collect()
    }
}

#[async_trait]
impl ClientSink for RecordingSink {
    async fn send(&self, message: ServerMessage) -> Result<(), TransportError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(TransportError::Io("broken pipe".into()));
        }
        self.sent.lock().unwrap().push(message);
        if let Some(active) = &self.shuts_down {
            active.deactivate();
        }
        Ok(())
    }
}

/// A client that sends `frames` and then keeps the connection open.
pub fn open_client(frames: Vec<String>) -> ClientStream {
    futures::stream::iter(frames.into_iter().map(Ok))
        .chain(futures::stream::pending())
        .boxed()
}

/// A client that sends `frames` and then disconnects.
pub fn closing_client(frames: Vec<String>) -> ClientStream {
    futures::stream::iter(frames.into_iter().map(Ok)).boxed()
}

/// A client driven by the test through the returned sender.
pub fn channel_client() -> (mpsc::Sender<Result<String, TransportError>>, ClientStream) {
    let (tx, rx) = mpsc::channel(64);
    (tx, ReceiverStream::new(rx).boxed())
}

/// Client JSON carrying `pcm` as an audio chunk.
pub fn audio_message(pcm: &[u8]) -> String {
    serde_json::json!({ "audio": crate::codec::encode_pcm(pcm) }).to_string()
}
