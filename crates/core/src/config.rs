use std::time::Duration;

pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
pub const DEFAULT_INBOUND_SAMPLE_RATE: u32 = 16_000;
pub const DEFAULT_OUTBOUND_SAMPLE_RATE: u32 = 24_000;

/// Per-session settings, fixed when the session starts.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    /// Linear gain applied to microphone audio. 1.0 leaves audio untouched.
    pub gain: f32,
    /// Silence longer than this ends the candidate's speech.
    pub silence_threshold: Duration,
    /// How often the silence monitor looks at the clock.
    pub silence_poll_interval: Duration,
    /// Capacity of the outbound audio queue.
    pub queue_capacity: usize,
    /// Priming turn sent upstream before the client is told we are ready.
    /// Empty means no priming turn. Replaced by the prepared interview prompt.
    pub initial_prompt: String,
    pub inbound_sample_rate: u32,
    pub outbound_sample_rate: u32,
    /// How long remaining relay tasks get to stop after shutdown starts.
    pub shutdown_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gain: 1.0,
            silence_threshold: Duration::from_secs_f32(2.0),
            silence_poll_interval: Duration::from_millis(500),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            initial_prompt: String::new(),
            inbound_sample_rate: DEFAULT_INBOUND_SAMPLE_RATE,
            outbound_sample_rate: DEFAULT_OUTBOUND_SAMPLE_RATE,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

impl SessionConfig {
    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    /// Checks the values a client can influence.
    pub fn validate(&self) -> Result<(), String> {
        if !self.gain.is_finite() || self.gain <= 0.0 {
            return Err(format!("Gain must be a positive number, got {}", self.gain));
        }
        if self.queue_capacity == 0 {
            return Err("Queue capacity must be at least 1".to_string());
        }
        if self.silence_poll_interval.is_zero() {
            return Err("Silence poll interval must be non-zero".to_string());
        }
        if self.inbound_sample_rate == 0 || self.outbound_sample_rate == 0 {
            return Err(format!(
                "Sample rates must be non-zero, got {} Hz in and {} Hz out",
                self.inbound_sample_rate, self.outbound_sample_rate
            ));
        }
        Ok(())
    }
}
