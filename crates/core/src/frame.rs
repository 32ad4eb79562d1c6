//! Media and response values that flow through the relay.

use bytes::Bytes;
use tokio::time::Instant;

/// Media type for raw little-endian PCM16 at the given sample rate.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// One chunk of client audio: mono PCM16 bytes, their media type, and the
/// instant the relay received them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    data: Bytes,
    mime_type: String,
    received_at: Instant,
}

impl AudioFrame {
    pub fn new(data: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
            received_at: Instant::now(),
        }
    }

    /// A frame carrying `data` but keeping this frame's media type and arrival time.
    pub fn with_data(&self, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            mime_type: self.mime_type.clone(),
            received_at: self.received_at,
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One item of an upstream turn.
///
/// A `Content` event may carry audio and text at the same time. `TurnComplete`
/// is always the last event of a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEvent {
    Content {
        audio: Option<Bytes>,
        text: Option<String>,
    },
    TurnComplete,
}

impl ResponseEvent {
    pub fn audio(data: impl Into<Bytes>) -> Self {
        ResponseEvent::Content {
            audio: Some(data.into()),
            text: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        ResponseEvent::Content {
            audio: None,
            text: Some(text.into()),
        }
    }
}
