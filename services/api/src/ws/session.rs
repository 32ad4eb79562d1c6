//! Manages the WebSocket connection lifecycle for an interview session.

use crate::state::AppState;
use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt, future,
    stream::{SplitSink, SplitStream},
};
use interviewer_core::{
    ClientSink, ClientStream, EndReason, ServerMessage, SessionRequest, SessionSupervisor,
    TransportError,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Handshake query parameters, e.g. `/ws?name=Ada&gain=1.5`.
#[derive(Deserialize, Debug, Default)]
pub struct WsQuery {
    pub name: Option<String>,
    pub gain: Option<String>,
}

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, query, state))
}

/// Runs one interview over an upgraded connection, from the handshake until
/// the supervisor reports the session closed.
#[instrument(name = "interview_session", skip_all, fields(session_id, candidate))]
async fn handle_socket(socket: WebSocket, query: WsQuery, state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    let span = tracing::Span::current();
    span.record("session_id", tracing::field::display(session_id));
    if let Some(name) = &query.name {
        span.record("candidate", name.as_str());
    }
    info!("New WebSocket connection.");

    let (socket_tx, socket_rx) = socket.split();
    let sink = Arc::new(WsClientSink::new(socket_tx));

    let request = SessionRequest {
        candidate_name: query.name,
        gain: query.gain,
        documents: state.documents.snapshot().await,
    };
    let supervisor = SessionSupervisor::new(
        state.config.session_config(),
        state.connector.clone(),
        state.preparer.clone(),
        sink.clone(),
    );
    let report = supervisor.run(request, client_stream(socket_rx)).await;

    match &report.end_reason {
        EndReason::Fault(reason) => warn!(%reason, "Interview session ended by a fault."),
        reason => info!(?reason, "Interview session finished."),
    }
    sink.close().await;
}

/// Text frames from the client. Binary frames are read as UTF-8 text; the
/// stream ends at the first close frame.
fn client_stream(socket_rx: SplitStream<WebSocket>) -> ClientStream {
    socket_rx
        .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(data)) => Some(Ok(String::from_utf8_lossy(&data).into_owned())),
                Ok(Message::Ping(_) | Message::Pong(_)) => None,
                Ok(Message::Close(_)) => None,
                Err(e) => Some(Err(TransportError::Io(e.to_string()))),
            })
        })
        .boxed()
}

/// The write half of the client socket, shared by the relay tasks.
pub struct WsClientSink {
    socket_tx: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsClientSink {
    pub fn new(socket_tx: SplitSink<WebSocket, Message>) -> Self {
        Self {
            socket_tx: Mutex::new(socket_tx),
        }
    }

    /// Sends a close frame. The client may already be gone.
    pub async fn close(&self) {
        let mut socket_tx = self.socket_tx.lock().await;
        if let Err(e) = socket_tx.send(Message::Close(None)).await {
            debug!(error = %e, "Client socket already closed.");
        }
    }
}

#[async_trait]
impl ClientSink for WsClientSink {
    async fn send(&self, message: ServerMessage) -> Result<(), TransportError> {
        let mut socket_tx = self.socket_tx.lock().await;
        send_msg(&mut socket_tx, &message)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
