use std::sync::Arc;

use repohook_core::keywords::KeywordMatcher;
use repohook_core::{Evidence, EvidenceSource, RepositoryCandidate};

use crate::context::RepositorySource;

/// Keyword hits for repository candidates. Any single hit passes.
pub struct KeywordAdapter {
    matcher: KeywordMatcher,
    source: Arc<dyn RepositorySource>,
    readme_char_budget: usize,
}

impl KeywordAdapter {
    pub fn new(
        matcher: KeywordMatcher,
        source: Arc<dyn RepositorySource>,
        readme_char_budget: usize,
    ) -> Self {
        Self {
            matcher,
            source,
            readme_char_budget,
        }
    }

    /// Name and description only; no network.
    pub fn match_description(&self, candidate: &RepositoryCandidate) -> Option<Evidence> {
        let text = format!("{} {}", candidate.full_name, candidate.description_or_empty());
        self.matcher
            .first_match(&text)
            .map(|keyword| Evidence::keyword(keyword, EvidenceSource::Description))
    }

    /// README prefix. A missing README or a failed fetch is no evidence.
    pub async fn match_readme(&self, candidate: &RepositoryCandidate) -> Option<Evidence> {
        let readme = match self
            .source
            .readme(&candidate.full_name, self.readme_char_budget)
            .await
        {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(repo = %candidate.full_name, error = %e, "README fetch failed");
                return None;
            }
        };
        self.matcher
            .first_match(&readme)
            .map(|keyword| Evidence::keyword(keyword, EvidenceSource::Readme))
    }
}
