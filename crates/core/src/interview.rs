//! What a session needs to know about the interview before it starts.

use async_trait::async_trait;
use std::path::PathBuf;

/// The candidate documents uploaded ahead of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Documents {
    pub resume: Option<PathBuf>,
    pub job_description: Option<PathBuf>,
}

impl Documents {
    pub fn is_complete(&self) -> bool {
        self.resume.is_some() && self.job_description.is_some()
    }
}

/// Everything the client supplied when it connected.
#[derive(Debug, Clone, Default)]
pub struct SessionRequest {
    pub candidate_name: Option<String>,
    /// Raw `gain` query value. `None` keeps the configured gain.
    pub gain: Option<String>,
    pub documents: Documents,
}

impl SessionRequest {
    /// The trimmed candidate name, if one was given.
    pub fn candidate_name(&self) -> Option<&str> {
        self.candidate_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Parses the requested gain. Only positive finite numbers are accepted.
    pub fn gain(&self) -> Result<Option<f32>, String> {
        let Some(raw) = self.gain.as_deref() else {
            return Ok(None);
        };
        match raw.trim().parse::<f32>() {
            Ok(gain) if gain.is_finite() && gain > 0.0 => Ok(Some(gain)),
            _ => Err(format!("Invalid gain '{}': expected a positive number", raw)),
        }
    }

    /// Checks everything that can be checked without doing any work.
    pub fn validate(&self) -> Result<(), String> {
        if self.candidate_name().is_none() {
            return Err("Candidate name is required".to_string());
        }
        if !self.documents.is_complete() {
            return Err("Please upload both resume and JD before connecting".to_string());
        }
        self.gain().map(|_| ())
    }
}

/// Turns the candidate's name and documents into the prompt that primes the
/// upstream session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InterviewPreparer: Send + Sync {
    async fn prepare(&self, candidate_name: &str, documents: &Documents) -> anyhow::Result<String>;
}
