//! Typed GitHub client — every call goes through a [`RequestGate`].
//!
//! Three gates, one per quota:
//! - **rest** — issues, timelines, events, pulls, repositories, READMEs
//! - **search** — `/search/*`, with a fixed pre-call delay
//! - **graphql** — batched repository-info queries

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use repohook_core::config::GitHubConfig;
use repohook_core::gate::{COMMIT_PULLS_PREVIEW, TIMELINE_PREVIEW};
use repohook_core::models::repository::split_full_name;
use repohook_core::{GateConfig, GateError, Issue, PullRequestRecord, RepositoryCandidate, RequestGate};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use crate::context::{PullRequestLookup, RepositorySource};

const ISSUES_PER_PAGE: usize = 100;
const SEARCH_ISSUES_PER_PAGE: usize = 10;

// ============================================================================
// Wire types (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    state: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    labels: Vec<RawLabel>,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    pull_request: Option<Value>,
}

impl From<RawIssue> for Issue {
    fn from(raw: RawIssue) -> Self {
        Self {
            number: raw.number,
            title: raw.title,
            body: raw.body,
            state: raw.state,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            closed_at: raw.closed_at,
            labels: raw.labels.into_iter().map(|l| l.name).collect(),
            html_url: raw.html_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRef {
    #[serde(rename = "ref", default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawPull {
    number: u64,
    #[serde(default)]
    state: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    merged: Option<bool>,
    #[serde(default)]
    base: Option<RawRef>,
}

impl From<RawPull> for PullRequestRecord {
    fn from(raw: RawPull) -> Self {
        Self {
            number: raw.number,
            state: raw.state,
            title: raw.title,
            url: raw.html_url,
            merged: raw.merged.unwrap_or(false),
            base_branch: raw.base.map(|b| b.name).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    full_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    stargazers_count: Option<u64>,
    #[serde(default)]
    topics: Vec<String>,
}

impl From<RawRepository> for RepositoryCandidate {
    fn from(raw: RawRepository) -> Self {
        Self {
            full_name: raw.full_name,
            description: raw.description,
            stars: raw.stargazers_count,
            language: raw.language,
            topics: raw.topics,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchPage<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct SearchIssueItem {
    number: u64,
    #[serde(default)]
    pull_request: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawReadme {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPullRef {
    number: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlRepository {
    name_with_owner: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stargazer_count: Option<u64>,
    #[serde(default)]
    primary_language: Option<GqlName>,
    #[serde(default)]
    repository_topics: Option<GqlTopics>,
}

#[derive(Debug, Deserialize)]
struct GqlName {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GqlTopics {
    #[serde(default)]
    nodes: Vec<GqlTopicNode>,
}

#[derive(Debug, Deserialize)]
struct GqlTopicNode {
    topic: GqlName,
}

impl From<GqlRepository> for RepositoryCandidate {
    fn from(raw: GqlRepository) -> Self {
        Self {
            full_name: raw.name_with_owner,
            description: raw.description,
            stars: raw.stargazer_count,
            language: raw.primary_language.map(|l| l.name),
            topics: raw
                .repository_topics
                .map(|t| t.nodes.into_iter().map(|n| n.topic.name).collect())
                .unwrap_or_default(),
        }
    }
}

// ============================================================================
// Public event shapes
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct TimelineIssueRef {
    pub number: u64,
    #[serde(default)]
    pub pull_request: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimelineSource {
    #[serde(default)]
    pub issue: Option<TimelineIssueRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimelineEvent {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub source: Option<TimelineSource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueEvent {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub commit_id: Option<String>,
}

/// Outcome of one GraphQL batch, keyed by the requested name.
#[derive(Debug, Default)]
pub struct BatchLookup {
    pub found: BTreeMap<String, RepositoryCandidate>,
    /// Not `owner/name`; never sent.
    pub invalid: Vec<String>,
    /// Aliases reported `NOT_FOUND`. REST still follows renames for these.
    pub not_found: Vec<String>,
    /// Null without a matching error, or an unparseable node.
    pub unresolved: Vec<String>,
}

// ============================================================================
// GitHubClient
// ============================================================================

pub struct GitHubClient {
    rest: RequestGate,
    search: RequestGate,
    graphql: RequestGate,
    api_url: String,
    graphql_url: String,
    authenticated: bool,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self, GateError> {
        Self::build(
            config,
            config.api_url.trim_end_matches('/').to_string(),
            config.graphql_url.clone(),
        )
    }

    /// Point every endpoint at `base_url` (GraphQL at `{base_url}/graphql`).
    pub fn with_base_url(config: &GitHubConfig, base_url: String) -> Result<Self, GateError> {
        let base = base_url.trim_end_matches('/').to_string();
        let graphql_url = format!("{}/graphql", base);
        Self::build(config, base, graphql_url)
    }

    fn build(config: &GitHubConfig, api_url: String, graphql_url: String) -> Result<Self, GateError> {
        let token = config.resolve_token();
        if token.is_none() {
            tracing::warn!("No GitHub token configured; using unauthenticated rate limits");
        }

        Ok(Self {
            rest: RequestGate::new(GateConfig::rest(config, token.clone()))?,
            search: RequestGate::new(GateConfig::search(config, token.clone()))?,
            graphql: RequestGate::new(GateConfig::graphql(config, token.clone()))?,
            api_url,
            graphql_url,
            authenticated: token.is_some(),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Total requests per gate: (rest, search, graphql).
    pub fn request_counts(&self) -> (u64, u64, u64) {
        (
            self.rest.request_count(),
            self.search.request_count(),
            self.graphql.request_count(),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn url_with_params(&self, path: &str, params: &[(&str, String)]) -> Result<String, GateError> {
        let raw = self.url(path);
        Url::parse_with_params(&raw, params)
            .map(String::from)
            .map_err(|e| GateError::Malformed {
                url: raw,
                message: e.to_string(),
            })
    }

    /// Closed issues, pull requests excluded, paging until a short page or `limit`.
    pub async fn closed_issues(&self, repo: &str, limit: Option<usize>) -> Result<Vec<Issue>, GateError> {
        let mut issues = Vec::new();
        let mut page = 1usize;

        loop {
            let url = self.url_with_params(
                &format!("/repos/{}/issues", repo),
                &[
                    ("state", "closed".to_string()),
                    ("per_page", ISSUES_PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ],
            )?;
            let batch: Vec<RawIssue> = self.rest.get(&url, None).await?;
            let fetched = batch.len();

            issues.extend(
                batch
                    .into_iter()
                    .filter(|raw| raw.pull_request.is_none())
                    .map(Issue::from),
            );
            tracing::debug!(repo, page, total = issues.len(), "Fetched closed issues page");

            if let Some(limit) = limit {
                if issues.len() >= limit {
                    issues.truncate(limit);
                    break;
                }
            }
            if fetched < ISSUES_PER_PAGE {
                break;
            }
            page += 1;
        }

        tracing::info!(repo, total = issues.len(), "Fetched closed issues");
        Ok(issues)
    }

    pub async fn issue_timeline(&self, repo: &str, number: u64) -> Result<Vec<TimelineEvent>, GateError> {
        let url = self.url(&format!("/repos/{}/issues/{}/timeline", repo, number));
        self.rest.get(&url, Some(TIMELINE_PREVIEW)).await
    }

    pub async fn issue_events(&self, repo: &str, number: u64) -> Result<Vec<IssueEvent>, GateError> {
        let url = self.url(&format!("/repos/{}/issues/{}/events", repo, number));
        self.rest.get(&url, None).await
    }

    /// Numbers of pull requests containing `sha`.
    pub async fn commit_pulls(&self, repo: &str, sha: &str) -> Result<Vec<u64>, GateError> {
        let url = self.url(&format!("/repos/{}/commits/{}/pulls", repo, sha));
        let pulls: Vec<RawPullRef> = self.rest.get(&url, Some(COMMIT_PULLS_PREVIEW)).await?;
        Ok(pulls.into_iter().map(|p| p.number).collect())
    }

    pub async fn fetch_pull_request(&self, repo: &str, number: u64) -> Result<PullRequestRecord, GateError> {
        let url = self.url(&format!("/repos/{}/pulls/{}", repo, number));
        let raw: RawPull = self.rest.get(&url, None).await?;
        Ok(raw.into())
    }

    /// Pull requests whose text mentions `#number`.
    pub async fn search_linked_prs(&self, repo: &str, number: u64) -> Result<Vec<u64>, GateError> {
        let url = self.url_with_params(
            "/search/issues",
            &[
                ("q", format!("repo:{} type:pr #{}", repo, number)),
                ("per_page", SEARCH_ISSUES_PER_PAGE.to_string()),
            ],
        )?;
        let page: SearchPage<SearchIssueItem> = self.search.get(&url, None).await?;
        Ok(page
            .items
            .into_iter()
            .filter(|item| item.pull_request.is_some())
            .map(|item| item.number)
            .collect())
    }

    /// Repository search sorted by stars, descending.
    pub async fn search_repositories(
        &self,
        query: &str,
        per_page: usize,
    ) -> Result<Vec<RepositoryCandidate>, GateError> {
        let url = self.url_with_params(
            "/search/repositories",
            &[
                ("q", query.to_string()),
                ("sort", "stars".to_string()),
                ("order", "desc".to_string()),
                ("per_page", per_page.to_string()),
            ],
        )?;
        let page: SearchPage<RawRepository> = self.search.get(&url, None).await?;
        Ok(page.items.into_iter().take(per_page).map(Into::into).collect())
    }

    /// `None` when the repository does not exist.
    pub async fn fetch_repository(&self, full_name: &str) -> Result<Option<RepositoryCandidate>, GateError> {
        let url = self.url(&format!("/repos/{}", full_name));
        match self.rest.get::<RawRepository>(&url, None).await {
            Ok(raw) => Ok(Some(raw.into())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Decoded README, cut to `char_budget` characters (0 = whole file).
    /// `None` when the repository has no README.
    pub async fn fetch_readme(&self, full_name: &str, char_budget: usize) -> Result<Option<String>, GateError> {
        let url = self.url(&format!("/repos/{}/readme", full_name));
        let raw: RawReadme = match self.rest.get(&url, None).await {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(encoded) = raw.content else {
            return Ok(None);
        };
        let text = decode_readme(&encoded).map_err(|message| GateError::Malformed { url, message })?;
        if char_budget == 0 {
            return Ok(Some(text));
        }
        Ok(Some(text.chars().take(char_budget).collect()))
    }

    /// One aliased GraphQL query for up to a batch of repositories.
    pub async fn repositories_batch(&self, names: &[String]) -> Result<BatchLookup, GateError> {
        let mut lookup = BatchLookup::default();
        let mut aliases: BTreeMap<String, &String> = BTreeMap::new();
        let mut selections = Vec::new();

        for (idx, name) in names.iter().enumerate() {
            let Some((owner, repo)) = split_full_name(name) else {
                lookup.invalid.push(name.clone());
                continue;
            };
            let alias = format!("r{}", idx);
            selections.push(format!(
                "  {}: repository(owner: {}, name: {}) {{ {} }}",
                alias,
                graphql_string(owner),
                graphql_string(repo),
                REPOSITORY_FIELDS
            ));
            aliases.insert(alias, name);
        }

        if aliases.is_empty() {
            return Ok(lookup);
        }

        let query = format!("query {{\n{}\n}}", selections.join("\n"));
        let response = self.graphql.post_graphql(&self.graphql_url, &query).await?;

        let not_found = response.not_found_aliases();
        for error in response.other_errors() {
            tracing::warn!(path = ?error.path, message = %error.message, "GraphQL field error");
        }

        for (alias, name) in aliases {
            if not_found.contains(&alias) {
                lookup.not_found.push(name.clone());
                continue;
            }
            let parsed = response
                .field(&alias)
                .and_then(|v| serde_json::from_value::<GqlRepository>(v.clone()).ok());
            match parsed {
                Some(repo) => {
                    lookup.found.insert(name.clone(), repo.into());
                }
                None => lookup.unresolved.push(name.clone()),
            }
        }

        Ok(lookup)
    }
}

const REPOSITORY_FIELDS: &str = "nameWithOwner description stargazerCount \
primaryLanguage { name } repositoryTopics(first: 10) { nodes { topic { name } } }";

/// JSON string literals are valid GraphQL string literals.
fn graphql_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// GitHub wraps base64 content at 60 columns.
fn decode_readme(encoded: &str) -> Result<String, String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| format!("invalid README encoding: {}", e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[async_trait]
impl PullRequestLookup for GitHubClient {
    async fn pull_request(&self, repo: &str, number: u64) -> Result<Option<PullRequestRecord>, GateError> {
        match self.fetch_pull_request(repo, number).await {
            Ok(pr) => Ok(Some(pr)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl RepositorySource for GitHubClient {
    async fn repository(&self, full_name: &str) -> Result<Option<RepositoryCandidate>, GateError> {
        self.fetch_repository(full_name).await
    }

    async fn readme(&self, full_name: &str, char_budget: usize) -> Result<Option<String>, GateError> {
        self.fetch_readme(full_name, char_budget).await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> GitHubConfig {
        GitHubConfig {
            token: Some("test-token".to_string()),
            rate_limit_cooldown_seconds: 0,
            max_rate_limit_cooldown_seconds: 0,
            max_rate_limit_retries: 1,
            search_delay_ms: 0,
            ..GitHubConfig::default()
        }
    }

    async fn client(server: &MockServer) -> GitHubClient {
        GitHubClient::with_base_url(&test_config(), server.uri()).unwrap()
    }

    #[tokio::test]
    async fn test_closed_issues_paginates_and_drops_pull_requests() {
        let server = MockServer::start().await;
        let first: Vec<Value> = (1..=100)
            .map(|n| {
                if n == 2 {
                    json!({ "number": n, "title": "pr", "pull_request": {} })
                } else {
                    json!({ "number": n, "title": "t", "body": "b", "labels": [{ "name": "bug" }] })
                }
            })
            .collect();

        Mock::given(method("GET"))
            .and(path("/repos/o/r/issues"))
            .and(query_param("state", "closed"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(first))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/issues"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "number": 101, "title": "last" }])))
            .expect(1)
            .mount(&server)
            .await;

        let issues = client(&server).await.closed_issues("o/r", None).await.unwrap();
        assert_eq!(issues.len(), 100);
        assert!(issues.iter().all(|i| i.number != 2));
        assert_eq!(issues[0].labels, vec!["bug"]);
    }

    #[tokio::test]
    async fn test_readme_is_decoded_and_truncated() {
        let server = MockServer::start().await;
        let encoded = base64::engine::general_purpose::STANDARD.encode("# Agent toolkit\nplans and tools");
        let wrapped = format!("{}\n{}", &encoded[..10], &encoded[10..]);

        Mock::given(method("GET"))
            .and(path("/repos/foo/bar/readme"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "content": wrapped })))
            .mount(&server)
            .await;

        let c = client(&server).await;
        let full = c.fetch_readme("foo/bar", 0).await.unwrap().unwrap();
        assert_eq!(full, "# Agent toolkit\nplans and tools");
        let cut = c.fetch_readme("foo/bar", 7).await.unwrap().unwrap();
        assert_eq!(cut, "# Agent");
    }

    #[tokio::test]
    async fn test_missing_readme_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/foo/bar/readme"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert_eq!(client(&server).await.fetch_readme("foo/bar", 100).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_search_linked_prs_uses_query_and_keeps_only_prs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/issues"))
            .and(query_param("q", "repo:o/r type:pr #42"))
            .and(header("authorization", "token test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    { "number": 50, "pull_request": {} },
                    { "number": 51 }
                ]
            })))
            .mount(&server)
            .await;

        let prs = client(&server).await.search_linked_prs("o/r", 42).await.unwrap();
        assert_eq!(prs, vec![50]);
    }

    #[tokio::test]
    async fn test_pull_request_maps_base_branch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/pulls/17"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "number": 17, "state": "closed", "title": "Fix",
                "html_url": "https://github.com/o/r/pull/17",
                "merged": true, "base": { "ref": "main" }
            })))
            .mount(&server)
            .await;

        let pr = client(&server).await.pull_request("o/r", 17).await.unwrap().unwrap();
        assert!(pr.is_merged_to_default());
        assert_eq!(pr.url, "https://github.com/o/r/pull/17");
    }

    #[tokio::test]
    async fn test_repositories_batch_tolerates_not_found_alias() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "r0": {
                        "nameWithOwner": "foo/bar",
                        "description": "An LLM agent framework",
                        "stargazerCount": 120,
                        "primaryLanguage": { "name": "Python" },
                        "repositoryTopics": { "nodes": [{ "topic": { "name": "agents" } }] }
                    },
                    "r1": null,
                    "r2": null
                },
                "errors": [{ "type": "NOT_FOUND", "path": ["r1"], "message": "Could not resolve" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let names = vec!["foo/bar".to_string(), "gone/away".to_string(), "odd/one".to_string(), "bad".to_string()];
        let lookup = client(&server).await.repositories_batch(&names).await.unwrap();

        let found = &lookup.found["foo/bar"];
        assert_eq!(found.stars, Some(120));
        assert_eq!(found.language.as_deref(), Some("Python"));
        assert_eq!(found.topics, vec!["agents"]);
        assert_eq!(lookup.not_found, vec!["gone/away".to_string()]);
        assert_eq!(lookup.invalid, vec!["bad".to_string()]);
        assert_eq!(lookup.unresolved, vec!["odd/one".to_string()]);
    }

    #[test]
    fn test_graphql_string_escapes_quotes() {
        assert_eq!(graphql_string(r#"we"ird"#), r#""we\"ird""#);
    }
}
