//! Classification gate — the second, LLM-backed phase over pipeline survivors.
//!
//! - Strictly sequential: the backend is both rate- and cost-limited
//! - Fail-closed: anything but a leading `YES` (any case) is a rejection,
//!   and so is a backend error
//! - Paced: after every `batch_size` items the gate sleeps for `pause`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use repohook_core::config::ClassifierSettings;
use repohook_core::{parse_yes_no, AiJudgment, ClassifierBackend, Issue, RepositoryCandidate};

use crate::context::{RepositorySource, RunContext};
use crate::pipeline::{PipelineItem, Resolved};

pub const TRUNCATION_MARKER: &str = "\n\n... (Content too long, truncated)";

/// `text` cut to `budget` characters plus [`TRUNCATION_MARKER`]; unchanged
/// when it already fits.
pub fn truncate_chars(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationPrompt {
    pub system: String,
    pub user: String,
}

/// Builds the prompt for one item.
#[async_trait]
pub trait PromptSource<T>: Send + Sync {
    async fn prompt(&self, item: &T) -> anyhow::Result<ClassificationPrompt>;
}

// ============================================================================
// Gate
// ============================================================================

pub struct ClassificationGate {
    backend: Arc<dyn ClassifierBackend>,
    temperature: f32,
    batch_size: usize,
    pause: Duration,
}

impl ClassificationGate {
    pub fn new(backend: Arc<dyn ClassifierBackend>, temperature: f32, batch_size: usize, pause: Duration) -> Self {
        Self {
            backend,
            temperature,
            batch_size: batch_size.max(1),
            pause,
        }
    }

    pub fn from_settings(backend: Arc<dyn ClassifierBackend>, settings: &ClassifierSettings) -> Self {
        Self::new(
            backend,
            settings.temperature,
            settings.batch_size,
            Duration::from_millis(settings.pause_ms),
        )
    }

    /// One yes/no judgment. Backend failures come back as a negative judgment.
    pub async fn judge(&self, prompt: &ClassificationPrompt) -> AiJudgment {
        match self
            .backend
            .complete(&prompt.system, &prompt.user, self.temperature)
            .await
        {
            Ok(response) => AiJudgment {
                is_positive: parse_yes_no(&response),
                raw_response: response.trim().to_string(),
            },
            Err(e) => {
                tracing::warn!(backend = self.backend.name(), error = %e, "Classification failed; rejecting");
                AiJudgment {
                    is_positive: false,
                    raw_response: format!("error: {}", e),
                }
            }
        }
    }

    /// The accepted subset of `items`, in input order, each verdict carrying
    /// its [`AiJudgment`].
    pub async fn classify_batch<T, P>(&self, items: Vec<Resolved<T>>, prompts: &P) -> Vec<Resolved<T>>
    where
        T: PipelineItem,
        P: PromptSource<T> + ?Sized,
    {
        let total = items.len();
        let mut accepted = Vec::new();

        for (idx, mut resolved) in items.into_iter().enumerate() {
            let judgment = match prompts.prompt(&resolved.item).await {
                Ok(prompt) => self.judge(&prompt).await,
                Err(e) => {
                    tracing::warn!(item = %resolved.item.label(), error = %e, "Prompt construction failed; rejecting");
                    AiJudgment {
                        is_positive: false,
                        raw_response: format!("error: {}", e),
                    }
                }
            };

            tracing::debug!(
                item = %resolved.item.label(),
                positive = judgment.is_positive,
                "Classified"
            );
            if judgment.is_positive {
                resolved.verdict.ai_judgment = Some(judgment);
                accepted.push(resolved);
            }

            let processed = idx + 1;
            if processed % self.batch_size == 0 && processed < total && !self.pause.is_zero() {
                tracing::debug!(processed, total, pause_ms = self.pause.as_millis() as u64, "Classifier pacing pause");
                tokio::time::sleep(self.pause).await;
            }
        }

        tracing::info!(total, accepted = accepted.len(), "Classification finished");
        accepted
    }
}

// ============================================================================
// Prompts
// ============================================================================

const REPO_SYSTEM_PROMPT: &str = "You are a GitHub repository classification expert.";

/// Repository judgment: definition, name, description and README prefix.
pub struct RepoPrompt {
    source: Arc<dyn RepositorySource>,
    ctx: Arc<RunContext>,
    definition: String,
    readme_char_budget: usize,
}

impl RepoPrompt {
    pub fn new(
        source: Arc<dyn RepositorySource>,
        ctx: Arc<RunContext>,
        definition: impl Into<String>,
        readme_char_budget: usize,
    ) -> Self {
        Self {
            source,
            ctx,
            definition: definition.into(),
            readme_char_budget,
        }
    }

    pub fn render(&self, name: &str, description: &str, readme: &str) -> ClassificationPrompt {
        let user = format!(
            "{definition}\n\n\
             Now, please determine whether the following GitHub repository is an Agent Repository.\n\n\
             **Repository Name**: {name}\n\
             **Repository Description**: {description}\n\
             **Repository README** (first {budget} chars):\n\
             {readme}\n\n\
             Please carefully analyze the repository information to determine if it fits the Agent Repository definition.\n\n\
             IMPORTANT: You must answer with ONLY \"YES\" or \"NO\". No explanations, no other text.\n\
             - Answer \"YES\" if this is clearly an Agent Repository\n\
             - Answer \"NO\" if it is not or if information is insufficient\n\n\
             Your answer (YES or NO only):",
            definition = self.definition.trim(),
            budget = self.readme_char_budget,
        );
        ClassificationPrompt {
            system: REPO_SYSTEM_PROMPT.to_string(),
            user,
        }
    }
}

#[async_trait]
impl PromptSource<RepositoryCandidate> for RepoPrompt {
    async fn prompt(&self, item: &RepositoryCandidate) -> anyhow::Result<ClassificationPrompt> {
        let mut candidate = item.clone();
        if let Some(Some(info)) = self.ctx.cached_repository(&item.full_name) {
            candidate.enrich(&info);
        }

        let readme = match self.source.readme(&candidate.full_name, self.readme_char_budget).await {
            Ok(Some(text)) if !text.trim().is_empty() => text,
            Ok(_) => "No README available".to_string(),
            Err(e) => {
                tracing::debug!(repo = %candidate.full_name, error = %e, "README unavailable for prompt");
                "No README available".to_string()
            }
        };
        let description = match candidate.description_or_empty().trim() {
            "" => "No description available",
            d => d,
        };

        Ok(self.render(&candidate.full_name, description, &readme))
    }
}

/// Issue judgment: definition in the system prompt, title and body in the user prompt.
pub struct IssuePrompt {
    definition: String,
    body_char_budget: usize,
}

impl IssuePrompt {
    pub fn new(definition: impl Into<String>, body_char_budget: usize) -> Self {
        Self {
            definition: definition.into(),
            body_char_budget,
        }
    }

    pub fn render(&self, issue: &Issue) -> ClassificationPrompt {
        let system = format!(
            "You are a GitHub issue classification expert. Your task is to determine if a given issue is an \"agent issue\".\n\n\
             Agent Issue Definition and Criteria:\n{}\n\n\
             Based on the above criteria, determine if the given issue is an agent issue.\n\
             Answer with \"Yes\" or \"No\", followed by a brief explanation (max 50 words).",
            self.definition.trim()
        );
        let user = format!(
            "Issue Title: {}\n\nIssue Description:\n{}\n\n\
             Is this an agent issue? Please answer \"Yes\" or \"No\" with a brief explanation.",
            issue.title,
            truncate_chars(issue.body.as_deref().unwrap_or(""), self.body_char_budget)
        );
        ClassificationPrompt { system, user }
    }
}

#[async_trait]
impl PromptSource<Issue> for IssuePrompt {
    async fn prompt(&self, item: &Issue) -> anyhow::Result<ClassificationPrompt> {
        Ok(self.render(item))
    }
}
