//! Frame codec: client wire messages in, client wire messages out, and the
//! PCM16 gain stage applied to microphone audio.

use crate::{
    frame::{AudioFrame, ResponseEvent, pcm_mime_type},
    protocol::{ClientEnvelope, Command, ControlMessage, ServerMessage, TERMINATION_KEYWORD},
};
use base64::Engine;

/// Encodes raw PCM bytes for the text transport.
pub fn encode_pcm(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decodes a base64 PCM payload received over the text transport.
pub fn decode_pcm(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(encoded)
}

/// Scales little-endian PCM16 samples by `factor`, saturating at the i16 range.
///
/// A trailing odd byte is not a sample and is copied through unchanged.
pub fn scale_pcm16(pcm: &[u8], factor: f32) -> Vec<u8> {
    let mut out = Vec::with_capacity(pcm.len());
    let mut chunks = pcm.chunks_exact(2);
    for chunk in &mut chunks {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]) as f32 * factor;
        let scaled = sample.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        out.extend_from_slice(&scaled.to_le_bytes());
    }
    out.extend_from_slice(chunks.remainder());
    out
}

/// Converts between the client's JSON messages and relay values.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    inbound_mime_type: String,
}

impl FrameCodec {
    /// A codec tagging decoded audio as PCM16 at `inbound_sample_rate`.
    pub fn new(inbound_sample_rate: u32) -> Self {
        Self {
            inbound_mime_type: pcm_mime_type(inbound_sample_rate),
        }
    }

    /// Parses one client message. Never fails: anything unusable comes back as
    /// [`ControlMessage::Malformed`].
    pub fn decode(&self, wire: &str) -> ControlMessage {
        let envelope: ClientEnvelope = match serde_json::from_str(wire) {
            Ok(envelope) => envelope,
            Err(e) => return ControlMessage::Malformed(format!("invalid JSON message: {}", e)),
        };

        if let Some(text) = envelope.text {
            if text.eq_ignore_ascii_case(TERMINATION_KEYWORD) {
                return ControlMessage::Command(Command::EndSession);
            }
            return ControlMessage::TextTurn(text);
        }
        if let Some(audio) = envelope.audio {
            return match decode_pcm(&audio) {
                Ok(bytes) => {
                    ControlMessage::AudioChunk(AudioFrame::new(bytes, self.inbound_mime_type.clone()))
                }
                Err(e) => ControlMessage::Malformed(format!("invalid audio payload: {}", e)),
            };
        }
        if let Some(name) = envelope.command {
            return ControlMessage::Command(Command::from_name(&name));
        }
        ControlMessage::Malformed("message has no text, audio or command field".to_string())
    }

    /// Applies `factor` to every sample in `frame`. A factor of exactly 1.0
    /// returns the frame untouched.
    pub fn apply_gain(frame: &AudioFrame, factor: f32) -> AudioFrame {
        if factor == 1.0 {
            return frame.clone();
        }
        frame.with_data(scale_pcm16(frame.data(), factor))
    }

    /// Builds the client message for an upstream event, if there is anything to send.
    pub fn encode(event: &ResponseEvent) -> Option<ServerMessage> {
        match event {
            ResponseEvent::Content { audio, text } => {
                let audio = audio
                    .as_ref()
                    .filter(|data| !data.is_empty())
                    .map(|data| encode_pcm(data));
                let text = text.clone().filter(|text| !text.is_empty());
                if audio.is_none() && text.is_none() {
                    return None;
                }
                Some(ServerMessage::Response { audio, text })
            }
            ResponseEvent::TurnComplete => Some(ServerMessage::turn_complete()),
        }
    }
}
