use crate::types::{
    AutomaticActivityDetection, ClientMessage, EndSensitivity, GenerationConfig, GoogleSearch,
    PrebuiltVoiceConfig, RealtimeInputConfig, ResponseModality, Setup, SpeechConfig,
    StartSensitivity, Tool, VoiceConfig,
};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-live-001";
pub const DEFAULT_VOICE: &str = "Puck";

/// How to reach Gemini Live and how to set up each session.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    pub activity_detection: AutomaticActivityDetection,
    pub google_search: bool,
    /// How long to wait for `setupComplete` after connecting.
    pub setup_timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            activity_detection: AutomaticActivityDetection {
                disabled: false,
                start_of_speech_sensitivity: StartSensitivity::High,
                end_of_speech_sensitivity: EndSensitivity::Low,
                prefix_padding_ms: 100,
                silence_duration_ms: 1000,
            },
            google_search: true,
            setup_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    /// The endpoint with the API key attached. Never log this.
    pub(crate) fn url(&self) -> String {
        format!("{}?key={}", self.endpoint, self.api_key)
    }

    pub(crate) fn setup_message(&self) -> ClientMessage {
        let tools = if self.google_search {
            vec![Tool {
                google_search: Some(GoogleSearch {}),
            }]
        } else {
            Vec::new()
        };
        ClientMessage::Setup(Setup {
            model: self.model.clone(),
            generation_config: GenerationConfig {
                response_modalities: vec![ResponseModality::Audio],
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: self.voice.clone(),
                        },
                    },
                }),
            },
            realtime_input_config: Some(RealtimeInputConfig {
                automatic_activity_detection: self.activity_detection.clone(),
            }),
            tools,
        })
    }
}
