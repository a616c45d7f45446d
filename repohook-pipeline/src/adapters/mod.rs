//! Evidence adapters — one isolated source of linkage evidence each.
//!
//! Issue adapters, cheapest first:
//! - [`GitLogAdapter`] — local clone, `git log` message search
//! - [`TimelineAdapter`] — cross-reference events on the issue timeline
//! - [`ClosingCommitAdapter`] — the closing commit's pull requests
//! - [`SearchAdapter`] — issue search, last resort
//!
//! Repository adapters:
//! - [`KeywordAdapter`] — keyword hits in name, description or README
//! - [`RepoInfoAdapter`] — batched GraphQL info with REST fallback
//!
//! An adapter failure never reaches the resolver: [`IssueEvidenceAdapter::gather`]
//! logs it and reports no evidence.

mod closing_commit;
mod git_log;
mod keyword;
mod repo_info;
mod search;
mod timeline;

use std::sync::Arc;

use async_trait::async_trait;
use repohook_core::config::IssueAdapterKind;
use repohook_core::{Evidence, EvidenceSource, Issue};

pub use closing_commit::ClosingCommitAdapter;
pub use git_log::GitLogAdapter;
pub use keyword::KeywordAdapter;
pub use repo_info::{PrefetchReport, RepoInfoAdapter};
pub use search::SearchAdapter;
pub use timeline::TimelineAdapter;

use crate::github::GitHubClient;

#[async_trait]
pub trait IssueEvidenceAdapter: Send + Sync {
    fn source(&self) -> EvidenceSource;

    /// Works from local data only (no API quota).
    fn is_local(&self) -> bool {
        false
    }

    async fn try_gather(&self, issue: &Issue) -> anyhow::Result<Vec<Evidence>>;

    /// Evidence for `issue`; any failure degrades to no evidence.
    async fn gather(&self, issue: &Issue) -> Vec<Evidence> {
        match self.try_gather(issue).await {
            Ok(evidence) => {
                tracing::debug!(
                    issue = issue.number,
                    adapter = %self.source(),
                    found = evidence.len(),
                    "Adapter finished"
                );
                evidence
            }
            Err(e) => {
                tracing::warn!(
                    issue = issue.number,
                    adapter = %self.source(),
                    error = %e,
                    "Adapter failed; treating as no evidence"
                );
                Vec::new()
            }
        }
    }
}

/// Adapters for `kinds` against `repo`, sorted cheapest first, duplicates
/// removed. The git-log adapter is skipped when no clone directory is given.
pub fn issue_adapters(
    kinds: &[IssueAdapterKind],
    repo: &str,
    client: Arc<GitHubClient>,
    clone_dir: Option<&std::path::Path>,
) -> Vec<Arc<dyn IssueEvidenceAdapter>> {
    let mut kinds = kinds.to_vec();
    kinds.sort();
    kinds.dedup();

    let mut adapters: Vec<Arc<dyn IssueEvidenceAdapter>> = Vec::new();
    for kind in kinds {
        match kind {
            IssueAdapterKind::GitLog => match clone_dir {
                Some(dir) => adapters.push(Arc::new(GitLogAdapter::new(dir))),
                None => tracing::warn!("git-log adapter enabled without a clone directory; skipping"),
            },
            IssueAdapterKind::Timeline => {
                adapters.push(Arc::new(TimelineAdapter::new(client.clone(), repo)))
            }
            IssueAdapterKind::ClosingCommit => {
                adapters.push(Arc::new(ClosingCommitAdapter::new(client.clone(), repo)))
            }
            IssueAdapterKind::Search => {
                adapters.push(Arc::new(SearchAdapter::new(client.clone(), repo)))
            }
        }
    }
    adapters
}

#[cfg(test)]
mod tests {
    use super::*;
    use repohook_core::config::GitHubConfig;

    #[test]
    fn test_issue_adapters_sorted_and_git_log_needs_clone() {
        let client = Arc::new(GitHubClient::with_base_url(&GitHubConfig::default(), "http://unused".to_string()).unwrap());
        let kinds = [IssueAdapterKind::Search, IssueAdapterKind::GitLog, IssueAdapterKind::Timeline, IssueAdapterKind::Search];

        let without = issue_adapters(&kinds, "o/r", client.clone(), None);
        let sources: Vec<_> = without.iter().map(|a| a.source()).collect();
        assert_eq!(sources, vec![EvidenceSource::Timeline, EvidenceSource::Search]);

        let dir = tempfile::tempdir().unwrap();
        let with = issue_adapters(&kinds, "o/r", client, Some(dir.path()));
        assert_eq!(with[0].source(), EvidenceSource::GitLog);
        assert!(with[0].is_local());
        assert_eq!(with.len(), 3);
    }
}
