use interviewer_core::SessionConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_voice: String,
    pub log_level: Level,
    pub prompts_path: PathBuf,
    pub upload_dir: PathBuf,
    pub silence_threshold: Duration,
    pub silence_poll_interval: Duration,
    pub queue_capacity: usize,
    pub interview_role: String,
    pub interview_minutes: u32,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address = parse_var("BIND_ADDRESS", "0.0.0.0:8765")?;

        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;
        let gemini_model = std::env::var("GEMINI_MODEL")
            .unwrap_or_else(|_| gemini_realtime::config::DEFAULT_MODEL.to_string());
        let gemini_voice = std::env::var("GEMINI_VOICE")
            .unwrap_or_else(|_| gemini_realtime::config::DEFAULT_VOICE.to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts"));
        let upload_dir = std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./temp"));

        let silence_threshold = parse_seconds("SILENCE_THRESHOLD_SECS", 2.0)?;
        let silence_poll_interval = parse_seconds("SILENCE_POLL_SECS", 0.5)?;
        let queue_capacity: usize = parse_var("QUEUE_CAPACITY", "10000")?;
        if queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "QUEUE_CAPACITY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let interview_role = std::env::var("INTERVIEW_ROLE").unwrap_or_else(|_| "SD1".to_string());
        let interview_minutes = parse_var("INTERVIEW_MINUTES", "15")?;

        Ok(Self {
            bind_address,
            gemini_api_key,
            gemini_model,
            gemini_voice,
            log_level,
            prompts_path,
            upload_dir,
            silence_threshold,
            silence_poll_interval,
            queue_capacity,
            interview_role,
            interview_minutes,
        })
    }

    /// Session defaults derived from this configuration. Per-connection
    /// settings such as gain are applied by the supervisor.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            silence_threshold: self.silence_threshold,
            silence_poll_interval: self.silence_poll_interval,
            queue_capacity: self.queue_capacity,
            ..SessionConfig::default()
        }
    }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

fn parse_seconds(name: &str, default: f64) -> Result<Duration, ConfigError> {
    let secs = match std::env::var(name) {
        Ok(raw) => raw
            .parse::<f64>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))?,
        Err(_) => default,
    };
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|duration| !duration.is_zero())
        .ok_or_else(|| {
            ConfigError::InvalidValue(
                name.to_string(),
                format!("'{}' is not a positive number of seconds", secs),
            )
        })
}
