use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use repohook_core::{Evidence, EvidenceSource, Issue};

use super::IssueEvidenceAdapter;
use crate::github::GitHubClient;

/// Pull requests containing the commit that closed the issue.
pub struct ClosingCommitAdapter {
    client: Arc<GitHubClient>,
    repo: String,
}

impl ClosingCommitAdapter {
    pub fn new(client: Arc<GitHubClient>, repo: &str) -> Self {
        Self {
            client,
            repo: repo.to_string(),
        }
    }
}

#[async_trait]
impl IssueEvidenceAdapter for ClosingCommitAdapter {
    fn source(&self) -> EvidenceSource {
        EvidenceSource::ClosingCommit
    }

    async fn try_gather(&self, issue: &Issue) -> anyhow::Result<Vec<Evidence>> {
        let events = self.client.issue_events(&self.repo, issue.number).await?;
        let shas: BTreeSet<&str> = events
            .iter()
            .filter(|e| e.event == "closed")
            .filter_map(|e| e.commit_id.as_deref())
            .collect();

        let mut numbers = BTreeSet::new();
        for sha in shas {
            match self.client.commit_pulls(&self.repo, sha).await {
                Ok(found) => numbers.extend(found),
                Err(e) => {
                    tracing::warn!(
                        repo = %self.repo,
                        issue = issue.number,
                        sha,
                        error = %e,
                        "Commit pull lookup failed; keeping evidence found so far"
                    );
                }
            }
        }

        Ok(numbers
            .into_iter()
            .map(|n| Evidence::linked_pr(n, EvidenceSource::ClosingCommit))
            .collect())
    }
}
