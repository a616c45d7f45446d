use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use repohook_core::{Evidence, EvidenceSource, Issue};

use super::IssueEvidenceAdapter;
use crate::github::GitHubClient;

/// Pull requests whose text mentions the issue. Uses the search quota, so it
/// runs last and only when nothing local was found.
pub struct SearchAdapter {
    client: Arc<GitHubClient>,
    repo: String,
}

impl SearchAdapter {
    pub fn new(client: Arc<GitHubClient>, repo: &str) -> Self {
        Self {
            client,
            repo: repo.to_string(),
        }
    }
}

#[async_trait]
impl IssueEvidenceAdapter for SearchAdapter {
    fn source(&self) -> EvidenceSource {
        EvidenceSource::Search
    }

    async fn try_gather(&self, issue: &Issue) -> anyhow::Result<Vec<Evidence>> {
        let numbers: BTreeSet<u64> = self
            .client
            .search_linked_prs(&self.repo, issue.number)
            .await?
            .into_iter()
            .filter(|&n| n != issue.number)
            .collect();

        Ok(numbers
            .into_iter()
            .map(|n| Evidence::linked_pr(n, EvidenceSource::Search))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repohook_core::config::GitHubConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_invalid_query_is_no_evidence() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/issues"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({ "message": "Validation Failed" })))
            .expect(2)
            .mount(&server)
            .await;

        let config = GitHubConfig { search_delay_ms: 0, ..GitHubConfig::default() };
        let client = Arc::new(GitHubClient::with_base_url(&config, server.uri()).unwrap());
        let adapter = SearchAdapter::new(client, "o/r");
        let issue: Issue = serde_json::from_value(json!({
            "number": 42, "title": "t", "body": "b", "state": "closed"
        }))
        .unwrap();

        assert!(adapter.try_gather(&issue).await.is_err());
        assert!(adapter.gather(&issue).await.is_empty());
    }
}
