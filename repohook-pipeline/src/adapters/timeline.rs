use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use repohook_core::{Evidence, EvidenceSource, Issue};

use super::IssueEvidenceAdapter;
use crate::github::{GitHubClient, TimelineEvent};

const LINK_EVENTS: &[&str] = &["cross-referenced", "connected"];

/// Pull requests cross-referenced from, or connected to, the issue.
pub struct TimelineAdapter {
    client: Arc<GitHubClient>,
    repo: String,
}

impl TimelineAdapter {
    pub fn new(client: Arc<GitHubClient>, repo: &str) -> Self {
        Self {
            client,
            repo: repo.to_string(),
        }
    }
}

pub(crate) fn linked_pull_requests(events: &[TimelineEvent]) -> BTreeSet<u64> {
    events
        .iter()
        .filter(|e| e.event.as_deref().is_some_and(|kind| LINK_EVENTS.contains(&kind)))
        .filter_map(|e| e.source.as_ref()?.issue.as_ref())
        .filter(|source| source.pull_request.is_some())
        .map(|source| source.number)
        .collect()
}

#[async_trait]
impl IssueEvidenceAdapter for TimelineAdapter {
    fn source(&self) -> EvidenceSource {
        EvidenceSource::Timeline
    }

    async fn try_gather(&self, issue: &Issue) -> anyhow::Result<Vec<Evidence>> {
        let events = self.client.issue_timeline(&self.repo, issue.number).await?;
        Ok(linked_pull_requests(&events)
            .into_iter()
            .map(|n| Evidence::linked_pr(n, EvidenceSource::Timeline))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repohook_core::config::GitHubConfig;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn issue(number: u64) -> Issue {
        serde_json::from_value(json!({
            "number": number, "title": "t", "body": "b", "state": "closed"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_timeline_keeps_pull_request_cross_references() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/issues/42/timeline"))
            .and(header("accept", "application/vnd.github.mockingbird-preview+json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "event": "cross-referenced", "source": { "issue": { "number": 17, "pull_request": {} } } },
                { "event": "cross-referenced", "source": { "issue": { "number": 8 } } },
                { "event": "labeled" },
                { "event": "connected", "source": { "issue": { "number": 19, "pull_request": {} } } }
            ])))
            .mount(&server)
            .await;

        let config = GitHubConfig { search_delay_ms: 0, ..GitHubConfig::default() };
        let client = Arc::new(GitHubClient::with_base_url(&config, server.uri()).unwrap());
        let adapter = TimelineAdapter::new(client, "o/r");

        let numbers: Vec<u64> = adapter
            .try_gather(&issue(42))
            .await
            .unwrap()
            .into_iter()
            .filter_map(|e| match e.kind {
                repohook_core::EvidenceKind::LinkedPr { number } => Some(number),
                _ => None,
            })
            .collect();
        assert_eq!(numbers, vec![17, 19]);
    }

    #[tokio::test]
    async fn test_timeline_not_found_degrades_to_no_evidence() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = Arc::new(GitHubClient::with_base_url(&GitHubConfig::default(), server.uri()).unwrap());
        let adapter = TimelineAdapter::new(client, "o/r");
        assert!(adapter.gather(&issue(42)).await.is_empty());
    }
}
