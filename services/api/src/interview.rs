//! Candidate documents and the interview prompt built from them.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use interviewer_core::{Documents, InterviewPreparer};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::info;

/// Which document an upload is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Resume,
    JobDescription,
}

impl DocumentKind {
    fn dir_name(self) -> &'static str {
        match self {
            DocumentKind::Resume => "resume",
            DocumentKind::JobDescription => "jd",
        }
    }
}

/// Remembers the most recent resume and job description uploads. Shared by
/// every connection: a new upload replaces the previous one for everyone.
#[derive(Debug)]
pub struct DocumentStore {
    upload_dir: PathBuf,
    current: RwLock<Documents>,
}

impl DocumentStore {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            current: RwLock::new(Documents::default()),
        }
    }

    /// Writes an upload to `<upload_dir>/<kind>/<file name>` and makes it the
    /// current document of that kind. Any directory part of `file_name` is
    /// discarded.
    pub async fn save(
        &self,
        kind: DocumentKind,
        file_name: &str,
        contents: &[u8],
    ) -> Result<PathBuf> {
        let Some(name) = Path::new(file_name).file_name() else {
            bail!("'{}' is not a valid file name", file_name);
        };
        let dir = self.upload_dir.join(kind.dir_name());
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(name);
        tokio::fs::write(&path, contents)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(?kind, path = %path.display(), bytes = contents.len(), "Stored upload.");

        let mut current = self.current.write().await;
        match kind {
            DocumentKind::Resume => current.resume = Some(path.clone()),
            DocumentKind::JobDescription => current.job_description = Some(path.clone()),
        }
        Ok(path)
    }

    pub async fn snapshot(&self) -> Documents {
        self.current.read().await.clone()
    }
}

/// Builds the interviewer prompt from the `agent_prompt` template.
pub struct TemplatePreparer {
    template: String,
    role: String,
    minutes: u32,
}

impl TemplatePreparer {
    pub const TEMPLATE_NAME: &'static str = "agent_prompt";

    pub fn new(template: impl Into<String>, role: impl Into<String>, minutes: u32) -> Self {
        Self {
            template: template.into(),
            role: role.into(),
            minutes,
        }
    }

    pub fn render(&self, candidate_name: &str, documents: &Documents) -> Result<String> {
        let resume = document_name(documents.resume.as_deref()).context("No resume uploaded")?;
        let job_description = document_name(documents.job_description.as_deref())
            .context("No job description uploaded")?;
        let objective = format!("Interview for {} position", role_title(&self.role));

        Ok(self
            .template
            .replace("{{name}}", candidate_name)
            .replace("{{candidateName}}", candidate_name)
            .replace("{{role}}", &self.role)
            .replace("{{mins}}", &self.minutes.to_string())
            .replace("{{objective}}", &objective)
            .replace("{{resume}}", &resume)
            .replace("{{jobDescription}}", &job_description))
    }
}

#[async_trait]
impl InterviewPreparer for TemplatePreparer {
    async fn prepare(&self, candidate_name: &str, documents: &Documents) -> Result<String> {
        for path in [&documents.resume, &documents.job_description].into_iter().flatten() {
            tokio::fs::metadata(path)
                .await
                .with_context(|| format!("Uploaded document {} is unreadable", path.display()))?;
        }
        let prompt = self.render(candidate_name, documents)?;
        info!(candidate = %candidate_name, chars = prompt.len(), "Interview prompt prepared.");
        Ok(prompt)
    }
}

fn document_name(path: Option<&Path>) -> Option<String> {
    Some(path?.file_name()?.to_string_lossy().into_owned())
}

fn role_title(role: &str) -> String {
    match role {
        "SD1" => "Software Development Engineer 1".to_string(),
        "SD2" => "Software Development Engineer 2".to_string(),
        other => other.to_string(),
    }
}
