//! Defines the JSON message protocol between the browser client and the relay.

use crate::frame::AudioFrame;
use serde::{Deserialize, Serialize};

/// Text turn that ends the session when sent by the client (case-insensitive).
pub const TERMINATION_KEYWORD: &str = "q";

/// A decoded client message. Routing depends only on the variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// A complete conversational turn typed by the candidate.
    TextTurn(String),
    /// One chunk of microphone audio.
    AudioChunk(AudioFrame),
    /// A control command.
    Command(Command),
    /// Anything that could not be understood. Carries the reason for logging.
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// The client typed the termination keyword.
    EndSession,
    /// Barge-in request. Accepted but not acted upon yet.
    Interrupt,
    /// A command name the relay does not know.
    Other(String),
}

impl Command {
    pub fn from_name(name: &str) -> Self {
        match name {
            "interrupt" => Command::Interrupt,
            other => Command::Other(other.to_string()),
        }
    }
}

/// Raw shape of a client message before routing. At most one field is acted
/// upon, in the order `text`, `audio`, `command`.
#[derive(Deserialize, Debug, Default)]
pub(crate) struct ClientEnvelope {
    pub text: Option<String>,
    pub audio: Option<String>,
    pub command: Option<String>,
}

/// Messages sent from the relay to the client.
///
/// Every variant serializes as a flat JSON object with no type tag, matching
/// what the browser client expects.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ServerMessage {
    /// The interview prompt was prepared for this candidate.
    Prepared { success: String },
    /// Lifecycle status, e.g. `{"status": "ready"}`.
    Status { status: SessionStatus },
    /// Part of the interviewer's answer. Either or both fields are present.
    Response {
        #[serde(skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    /// The interviewer finished a turn.
    TurnComplete { turn_complete: bool },
    /// A command for the client, e.g. `{"command": "session_ended"}`.
    Command { command: ClientCommand },
    /// A fatal error. Sent best effort before the connection closes.
    Error { error: String },
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Ready,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientCommand {
    SessionEnded,
}

impl ServerMessage {
    pub fn prepared() -> Self {
        ServerMessage::Prepared {
            success: "Interview prepared successfully".to_string(),
        }
    }

    pub fn ready() -> Self {
        ServerMessage::Status {
            status: SessionStatus::Ready,
        }
    }

    pub fn turn_complete() -> Self {
        ServerMessage::TurnComplete {
            turn_complete: true,
        }
    }

    pub fn session_ended() -> Self {
        ServerMessage::Command {
            command: ClientCommand::SessionEnded,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            error: message.into(),
        }
    }
}
