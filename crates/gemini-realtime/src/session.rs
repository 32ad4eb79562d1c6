//! A Gemini Live session behind the relay's upstream traits.

use crate::{
    config::GeminiConfig,
    types::{ClientMessage, ServerContent, ServerMessage},
};
use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use interviewer_core::{
    AudioFrame, ResponseEvent, TurnStream, UpstreamConnector, UpstreamError, UpstreamSession,
    codec::{decode_pcm, encode_pcm},
};
use serde::Serialize;
use std::{collections::VecDeque, sync::Arc};
use tokio::{
    net::TcpStream,
    sync::{Mutex, MutexGuard},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message as WsMessage,
};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens a new Gemini Live session per relay session.
pub struct GeminiConnector {
    config: Arc<GeminiConfig>,
}

impl GeminiConnector {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl UpstreamConnector for GeminiConnector {
    async fn connect(&self) -> Result<Arc<dyn UpstreamSession>, UpstreamError> {
        let session = GeminiSession::connect(&self.config).await?;
        Ok(Arc::new(session))
    }
}

/// One open `BidiGenerateContent` connection.
///
/// Writes and reads are locked separately, so sending audio never waits on a
/// turn being read.
pub struct GeminiSession {
    sink: Mutex<SplitSink<WsStream, WsMessage>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl GeminiSession {
    /// Connects, sends `setup` and waits for `setupComplete`.
    pub async fn connect(config: &GeminiConfig) -> Result<Self, UpstreamError> {
        info!(model = %config.model, "Connecting to Gemini Live.");
        let (mut ws, _) = connect_async(config.url())
            .await
            .map_err(|e| UpstreamError::Connect(e.to_string()))?;

        let setup = to_frame(&config.setup_message())?;
        ws.send(setup)
            .await
            .map_err(|e| UpstreamError::Connect(format!("failed to send setup: {}", e)))?;

        tokio::time::timeout(config.setup_timeout, wait_for_setup(&mut ws))
            .await
            .map_err(|_| {
                UpstreamError::Timeout(format!(
                    "no setupComplete within {}s",
                    config.setup_timeout.as_secs()
                ))
            })??;
        info!("Gemini Live setup complete.");

        let (sink, stream) = ws.split();
        Ok(Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }

    async fn send_message(&self, message: &ClientMessage) -> Result<(), UpstreamError> {
        let frame = to_frame(message)?;
        self.sink
            .lock()
            .await
            .send(frame)
            .await
            .map_err(|e| UpstreamError::Send(e.to_string()))
    }
}

#[async_trait]
impl UpstreamSession for GeminiSession {
    async fn send_text(&self, text: &str, end_of_turn: bool) -> Result<(), UpstreamError> {
        self.send_message(&ClientMessage::user_text(text, end_of_turn))
            .await
    }

    async fn send_audio(&self, frame: &AudioFrame) -> Result<(), UpstreamError> {
        self.send_message(&ClientMessage::audio(frame.mime_type(), encode_pcm(frame.data())))
            .await
    }

    async fn signal_audio_stream_end(&self) -> Result<(), UpstreamError> {
        self.send_message(&ClientMessage::audio_stream_end()).await
    }

    async fn receive<'a>(&'a self) -> Result<TurnStream<'a>, UpstreamError> {
        let reader = TurnReader {
            frames: self.stream.lock().await,
            pending: VecDeque::new(),
            done: false,
        };
        let turn = futures_util::stream::unfold(reader, |mut reader| async move {
            let event = reader.next_event().await?;
            Some((event, reader))
        });
        Ok(turn.boxed())
    }

    async fn close(&self) -> Result<(), UpstreamError> {
        let mut sink = self.sink.lock().await;
        sink.send(WsMessage::Close(None))
            .await
            .map_err(|e| UpstreamError::Send(e.to_string()))?;
        debug!("Gemini Live connection closed.");
        Ok(())
    }
}

/// Reads one turn. Holds the read half for the life of the turn.
struct TurnReader<'a> {
    frames: MutexGuard<'a, SplitStream<WsStream>>,
    pending: VecDeque<ResponseEvent>,
    done: bool,
}

impl TurnReader<'_> {
    async fn next_event(&mut self) -> Option<Result<ResponseEvent, UpstreamError>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                if event == ResponseEvent::TurnComplete {
                    self.done = true;
                    self.pending.clear();
                }
                return Some(Ok(event));
            }
            if self.done {
                return None;
            }

            let payload = match self.frames.next().await {
                Some(Ok(WsMessage::Text(text))) => text.as_bytes().to_vec(),
                // Gemini sends JSON in binary frames too.
                Some(Ok(WsMessage::Binary(data))) => data.to_vec(),
                Some(Ok(WsMessage::Close(frame))) => {
                    warn!(?frame, "Gemini Live closed the connection.");
                    self.done = true;
                    return Some(Err(UpstreamError::Closed));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(UpstreamError::Receive(e.to_string())));
                }
                None => {
                    self.done = true;
                    return Some(Err(UpstreamError::Closed));
                }
            };

            match serde_json::from_slice::<ServerMessage>(&payload) {
                Ok(message) => {
                    if let Some(go_away) = message.go_away {
                        warn!(time_left = ?go_away.time_left, "Gemini Live is about to disconnect.");
                    }
                    if let Some(content) = message.server_content {
                        self.pending.extend(content_events(content));
                    }
                }
                Err(e) => warn!(error = %e, "Ignoring unparseable Gemini message."),
            }
        }
    }
}

/// Folds one `serverContent` into relay events. Audio parts are concatenated
/// and so are text parts, so the client gets at most one content message.
pub(crate) fn content_events(content: ServerContent) -> Vec<ResponseEvent> {
    let mut audio = Vec::new();
    let mut text = String::new();
    for part in content.model_turn.map(|turn| turn.parts).unwrap_or_default() {
        if let Some(inline) = part.inline_data {
            match decode_pcm(&inline.data) {
                Ok(bytes) => audio.extend_from_slice(&bytes),
                Err(e) => warn!(error = %e, "Dropping undecodable audio part."),
            }
        }
        if let Some(part_text) = part.text {
            text.push_str(&part_text);
        }
    }
    if content.interrupted {
        debug!("Gemini reported an interrupted turn.");
    }

    let mut events = Vec::new();
    if !audio.is_empty() || !text.is_empty() {
        events.push(ResponseEvent::Content {
            audio: (!audio.is_empty()).then(|| audio.into()),
            text: (!text.is_empty()).then_some(text),
        });
    }
    if content.turn_complete {
        events.push(ResponseEvent::TurnComplete);
    }
    events
}

async fn wait_for_setup(ws: &mut WsStream) -> Result<(), UpstreamError> {
    while let Some(frame) = ws.next().await {
        let payload = match frame {
            Ok(WsMessage::Text(text)) => text.as_bytes().to_vec(),
            Ok(WsMessage::Binary(data)) => data.to_vec(),
            Ok(WsMessage::Close(frame)) => {
                return Err(UpstreamError::Connect(format!(
                    "connection closed before setupComplete: {:?}",
                    frame
                )));
            }
            Ok(_) => continue,
            Err(e) => return Err(UpstreamError::Connect(e.to_string())),
        };
        match serde_json::from_slice::<ServerMessage>(&payload) {
            Ok(message) if message.setup_complete.is_some() => return Ok(()),
            Ok(_) => debug!("Skipping message received before setupComplete."),
            Err(e) => warn!(error = %e, "Unparseable message during setup."),
        }
    }
    Err(UpstreamError::Closed)
}

fn to_frame(message: &impl Serialize) -> Result<WsMessage, UpstreamError> {
    let json = serde_json::to_string(message).map_err(|e| UpstreamError::Protocol(e.to_string()))?;
    Ok(WsMessage::Text(json.into()))
}
