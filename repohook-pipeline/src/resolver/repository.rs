use std::sync::Arc;

use async_trait::async_trait;
use repohook_core::keywords::KeywordMatcher;
use repohook_core::{Evidence, EvidenceKind, EvidenceSource, RepositoryCandidate, Verdict};

use crate::adapters::KeywordAdapter;
use crate::context::{RepositorySource, RunContext};
use crate::pipeline::ItemResolver;

pub const EXCLUDED_TERM: &str = "excluded term";
pub const STARS_UNAVAILABLE: &str = "stars unavailable";
pub const NO_KEYWORD_MATCH: &str = "no keyword match";

/// Repository candidate pre-filter, cheapest predicate first:
///
/// 1. no excluded term in name or description
/// 2. keyword hit in name or description
/// 3. star count at or above `min_stars`
/// 4. keyword hit in the README, only when step 2 missed
///
/// Classification is a later, separate stage.
pub struct RepoResolver {
    keywords: KeywordAdapter,
    excluded: KeywordMatcher,
    min_stars: u64,
    source: Arc<dyn RepositorySource>,
    ctx: Arc<RunContext>,
}

impl RepoResolver {
    pub fn new(
        keywords: KeywordAdapter,
        excluded: KeywordMatcher,
        min_stars: u64,
        source: Arc<dyn RepositorySource>,
        ctx: Arc<RunContext>,
    ) -> Self {
        Self {
            keywords,
            excluded,
            min_stars,
            source,
            ctx,
        }
    }

    pub async fn evaluate(&self, candidate: &RepositoryCandidate) -> Verdict {
        // Whatever a prefetch already learned is free to use.
        let mut candidate = candidate.clone();
        if let Some(Some(info)) = self.ctx.cached_repository(&candidate.full_name) {
            candidate.enrich(&info);
        }

        let text = format!("{} {}", candidate.full_name, candidate.description_or_empty());
        if let Some(term) = self.excluded.first_match(&text) {
            return Verdict::reject(format!("{}: {}", EXCLUDED_TERM, term));
        }

        let mut evidence = Vec::new();
        let mut sources = vec![EvidenceSource::Description];
        let description_hit = self.keywords.match_description(&candidate);
        evidence.extend(description_hit.clone());

        if self.min_stars > 0 {
            sources.push(EvidenceSource::RepositoryInfo);
            let stars = match candidate.stars {
                Some(stars) => Some(stars),
                None => self
                    .ctx
                    .repository(self.source.as_ref(), &candidate.full_name)
                    .await
                    .and_then(|info| info.stars),
            };
            let Some(stars) = stars else {
                return Verdict::inconclusive(STARS_UNAVAILABLE)
                    .with_evidence(evidence)
                    .with_sources(sources, Default::default());
            };
            evidence.push(Evidence::stars(stars));
            if stars < self.min_stars {
                return Verdict::reject(format!("{} stars < {}", stars, self.min_stars))
                    .with_evidence(evidence)
                    .with_sources(sources, Default::default());
            }
        }

        let hit = match description_hit {
            Some(hit) => Some(hit),
            None => {
                sources.push(EvidenceSource::Readme);
                let readme_hit = self.keywords.match_readme(&candidate).await;
                evidence.extend(readme_hit.clone());
                readme_hit
            }
        };

        let verdict = match hit {
            Some(Evidence {
                kind: EvidenceKind::KeywordMatch { keyword },
                source,
            }) => Verdict::accept(format!("keyword '{}' in {}", keyword, source)),
            _ => Verdict::reject(NO_KEYWORD_MATCH),
        };
        verdict
            .with_evidence(evidence)
            .with_sources(sources, Default::default())
    }
}

#[async_trait]
impl ItemResolver<RepositoryCandidate> for RepoResolver {
    async fn resolve(&self, item: &RepositoryCandidate) -> anyhow::Result<Verdict> {
        Ok(self.evaluate(item).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repohook_core::{Decision, GateError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeSource {
        stars: Option<u64>,
        readme: Option<String>,
        repo_calls: AtomicUsize,
        readme_calls: AtomicUsize,
    }

    #[async_trait]
    impl RepositorySource for FakeSource {
        async fn repository(&self, full_name: &str) -> Result<Option<RepositoryCandidate>, GateError> {
            self.repo_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(RepositoryCandidate {
                stars: self.stars,
                ..RepositoryCandidate::named(full_name)
            }))
        }

        async fn readme(&self, _full_name: &str, _char_budget: usize) -> Result<Option<String>, GateError> {
            self.readme_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.readme.clone())
        }
    }

    fn resolver(source: Arc<FakeSource>, min_stars: u64, excluded: &[&str]) -> RepoResolver {
        let keywords = KeywordAdapter::new(KeywordMatcher::default(), source.clone(), 3000);
        RepoResolver::new(
            keywords,
            KeywordMatcher::new(excluded),
            min_stars,
            source,
            Arc::new(RunContext::default()),
        )
    }

    fn candidate(name: &str, description: &str, stars: Option<u64>) -> RepositoryCandidate {
        RepositoryCandidate {
            description: Some(description.to_string()),
            stars,
            ..RepositoryCandidate::named(name)
        }
    }

    #[tokio::test]
    async fn test_below_min_stars_rejects_before_readme() {
        let source = Arc::new(FakeSource::default());
        let verdict = resolver(source.clone(), 10, &[])
            .evaluate(&candidate("foo/bar", "An LLM agent framework", Some(5)))
            .await;

        assert_eq!(verdict.decision, Decision::Reject);
        assert_eq!(verdict.reason, "5 stars < 10");
        assert_eq!(source.readme_calls.load(Ordering::SeqCst), 0);
        assert_eq!(source.repo_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_description_hit_skips_readme() {
        let source = Arc::new(FakeSource::default());
        let verdict = resolver(source.clone(), 10, &[])
            .evaluate(&candidate("foo/bar", "An LLM agent framework", Some(50)))
            .await;

        assert!(verdict.is_accept());
        assert!(verdict.evidence.contains(&Evidence::stars(50)));
        assert_eq!(source.readme_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_readme_rescues_plain_description() {
        let source = Arc::new(FakeSource {
            readme: Some("# Tool\nBuilt on LangChain".to_string()),
            ..Default::default()
        });
        let verdict = resolver(source.clone(), 0, &[])
            .evaluate(&candidate("foo/tool", "A handy tool", None))
            .await;

        assert!(verdict.is_accept());
        assert_eq!(verdict.evidence, vec![Evidence::keyword("langchain", EvidenceSource::Readme)]);
        assert_eq!(
            verdict.evidence_sources_used,
            vec![EvidenceSource::Description, EvidenceSource::Readme]
        );
        // min_stars 0 disables the star stage entirely
        assert_eq!(source.repo_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_stars_are_looked_up_once() {
        let source = Arc::new(FakeSource { stars: Some(12), ..Default::default() });
        let r = resolver(source.clone(), 10, &[]);
        let c = candidate("foo/agent", "autonomous agent", None);

        assert!(r.evaluate(&c).await.is_accept());
        assert!(r.evaluate(&c).await.is_accept());
        assert_eq!(source.repo_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_stars_are_inconclusive() {
        let source = Arc::new(FakeSource::default());
        let verdict = resolver(source, 10, &[])
            .evaluate(&candidate("foo/agent", "autonomous agent", None))
            .await;
        assert_eq!(verdict.decision, Decision::Inconclusive);
        assert_eq!(verdict.reason, STARS_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_excluded_term_rejects_first() {
        let source = Arc::new(FakeSource::default());
        let verdict = resolver(source.clone(), 10, &["crypto"])
            .evaluate(&candidate("foo/agent", "Crypto trading agent", None))
            .await;
        assert_eq!(verdict.reason, "excluded term: crypto");
        assert_eq!(source.repo_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_keyword_anywhere_rejects() {
        let source = Arc::new(FakeSource {
            readme: Some("A JavaScript UI library".to_string()),
            ..Default::default()
        });
        let verdict = resolver(source, 0, &[])
            .evaluate(&candidate("facebook/react", "UI library", Some(200_000)))
            .await;
        assert_eq!(verdict.reason, NO_KEYWORD_MATCH);
    }
}
