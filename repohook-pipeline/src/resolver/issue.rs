use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use repohook_core::{Evidence, EvidenceConfidence, EvidenceKind, EvidenceSource, Issue, Verdict};

use crate::adapters::IssueEvidenceAdapter;
use crate::context::{PullRequestLookup, RunContext};
use crate::pipeline::ItemResolver;

pub const NO_DESCRIPTION: &str = "no description";
pub const NO_LINKED_PR: &str = "no linked PR";
pub const NO_DEFAULT_BRANCH_MERGE: &str = "no merge to default branch";

/// Closed issue → merged pull request linkage.
///
/// 1. the issue has a text body
/// 2. the union of adapter evidence, cheapest first, is non-empty; the union
///    stops as soon as a local adapter finds something, and the search adapter
///    only runs when no local adapter is enabled
/// 3. at least one linked PR is merged into `main` or `master`
pub struct IssueResolver {
    repo: String,
    adapters: Vec<Arc<dyn IssueEvidenceAdapter>>,
    pulls: Arc<dyn PullRequestLookup>,
    ctx: Arc<RunContext>,
}

impl IssueResolver {
    /// `adapters` must already be in cost order.
    pub fn new(
        repo: &str,
        adapters: Vec<Arc<dyn IssueEvidenceAdapter>>,
        pulls: Arc<dyn PullRequestLookup>,
        ctx: Arc<RunContext>,
    ) -> Self {
        Self {
            repo: repo.to_string(),
            adapters,
            pulls,
            ctx,
        }
    }

    pub async fn evaluate(&self, issue: &Issue) -> Verdict {
        if !issue.has_description() {
            return Verdict::reject(NO_DESCRIPTION);
        }

        let local_enabled = self.adapters.iter().any(|a| a.is_local());
        let mut local_hit = false;
        let mut sources = Vec::new();
        let mut evidence: Vec<Evidence> = Vec::new();

        for adapter in &self.adapters {
            // Search shares the strictest quota; local-clone runs never spend it.
            if local_enabled && adapter.source() == EvidenceSource::Search {
                tracing::debug!(
                    repo = %self.repo,
                    issue = issue.number,
                    "Local clone enabled; skipping search adapter"
                );
                continue;
            }
            sources.push(adapter.source());
            let found = adapter.gather(issue).await;
            let hit = !found.is_empty();
            evidence.extend(found);

            if adapter.is_local() {
                if hit {
                    local_hit = true;
                    break;
                }
                tracing::info!(
                    repo = %self.repo,
                    issue = issue.number,
                    adapter = %adapter.source(),
                    "No local evidence; falling back to API adapters"
                );
            }
        }

        let confidence = match (local_hit, local_enabled) {
            (true, _) => EvidenceConfidence::Local,
            (false, true) => EvidenceConfidence::DegradedToApi,
            (false, false) => EvidenceConfidence::ApiOnly,
        };

        let candidates: BTreeSet<u64> = evidence
            .iter()
            .filter_map(|e| match e.kind {
                EvidenceKind::LinkedPr { number } => Some(number),
                _ => None,
            })
            .collect();

        if candidates.is_empty() {
            return Verdict::reject(NO_LINKED_PR)
                .with_evidence(evidence)
                .with_sources(sources, confidence);
        }

        let mut merged = Vec::new();
        for number in candidates {
            if let Some(pr) = self.ctx.pull_request(self.pulls.as_ref(), &self.repo, number).await {
                if pr.is_merged_to_default() {
                    merged.push(pr);
                }
            }
        }

        if merged.is_empty() {
            return Verdict::reject(NO_DEFAULT_BRANCH_MERGE)
                .with_evidence(evidence)
                .with_sources(sources, confidence);
        }

        let mut verdict = Verdict::accept(format!("{} PR(s) merged to default branch", merged.len()))
            .with_evidence(evidence)
            .with_sources(sources, confidence);
        verdict.merged_prs = merged;
        verdict
    }
}

#[async_trait]
impl ItemResolver<Issue> for IssueResolver {
    async fn resolve(&self, item: &Issue) -> anyhow::Result<Verdict> {
        Ok(self.evaluate(item).await)
    }
}
