//! Rate-limited request gate for the GitHub REST and GraphQL APIs.
//!
//! Every outbound GitHub call goes through a [`RequestGate`]. The gate:
//! - classifies HTTP failures into [`GateError`] (404, 403/429, 422, other)
//! - on a rate-limit response, enters a cooldown shared by every caller of the
//!   same gate, then retries the same request; attempts are capped and the
//!   cooldown grows exponentially with jitter
//! - tolerates per-field `NOT_FOUND` errors inside GraphQL batch responses
//!
//! REST, search and GraphQL quotas are independent, so each gets its own gate
//! instance and a cooldown on one never blocks the others.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_retry::strategy::{jitter, ExponentialBackoff};

use crate::config::GitHubConfig;

/// Default REST media type.
pub const GITHUB_JSON: &str = "application/vnd.github.v3+json";
/// Timeline events (preview).
pub const TIMELINE_PREVIEW: &str = "application/vnd.github.mockingbird-preview+json";
/// Commit -> pull request lookup (preview).
pub const COMMIT_PULLS_PREVIEW: &str = "application/vnd.github.groot-preview+json";

const USER_AGENT: &str = concat!("repohook/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Error taxonomy
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("not found: {url}")]
    NotFound { url: String },

    #[error("rate limited after {attempts} attempt(s): {url}")]
    RateLimited { url: String, attempts: usize },

    #[error("malformed request or response for {url}: {message}")]
    Malformed { url: String, message: String },

    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("request timed out: {url}")]
    Timeout { url: String },
}

impl GateError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Map a non-success status to its failure class. `None` for 2xx.
pub fn classify_status(status: u16, url: &str, body: &str) -> Option<GateError> {
    let url = url.to_string();
    match status {
        200..=299 => None,
        404 => Some(GateError::NotFound { url }),
        403 | 429 => Some(GateError::RateLimited { url, attempts: 1 }),
        422 => Some(GateError::Malformed {
            url,
            message: api_message(body).unwrap_or_else(|| "unprocessable entity".to_string()),
        }),
        other => Some(GateError::Network {
            url,
            message: format!("HTTP {}", other),
        }),
    }
}

fn api_message(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["message"].as_str().map(str::to_string))
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Quota label used in logs ("rest", "search", "graphql").
    pub name: String,
    pub token: Option<String>,
    pub timeout: Duration,
    pub cooldown: Duration,
    pub max_cooldown: Duration,
    pub max_retries: usize,
    /// Fixed pause before each request.
    pub pre_request_delay: Duration,
}

impl GateConfig {
    fn from_github(name: &str, config: &GitHubConfig, token: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            token,
            timeout: Duration::from_secs(config.timeout_seconds),
            cooldown: Duration::from_secs(config.rate_limit_cooldown_seconds),
            max_cooldown: Duration::from_secs(config.max_rate_limit_cooldown_seconds),
            max_retries: config.max_rate_limit_retries,
            pre_request_delay: Duration::ZERO,
        }
    }

    pub fn rest(config: &GitHubConfig, token: Option<String>) -> Self {
        Self::from_github("rest", config, token)
    }

    pub fn search(config: &GitHubConfig, token: Option<String>) -> Self {
        Self {
            pre_request_delay: Duration::from_millis(config.search_delay_ms),
            ..Self::from_github("search", config, token)
        }
    }

    pub fn graphql(config: &GitHubConfig, token: Option<String>) -> Self {
        Self::from_github("graphql", config, token)
    }
}

// ============================================================================
// GraphQL response envelope
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub error_type: Option<String>,
    #[serde(default)]
    pub path: Vec<Value>,
}

impl GraphQlError {
    pub fn is_not_found(&self) -> bool {
        self.error_type.as_deref() == Some("NOT_FOUND")
    }

    /// Top-level alias the error refers to, if any.
    pub fn alias(&self) -> Option<&str> {
        self.path.first().and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphQlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

impl GraphQlResponse {
    /// Non-null value of a top-level alias.
    pub fn field(&self, alias: &str) -> Option<&Value> {
        self.data
            .as_ref()
            .and_then(|d| d.get(alias))
            .filter(|v| !v.is_null())
    }

    pub fn not_found_aliases(&self) -> BTreeSet<String> {
        self.errors
            .iter()
            .filter(|e| e.is_not_found())
            .filter_map(|e| e.alias().map(str::to_string))
            .collect()
    }

    /// Errors other than per-field `NOT_FOUND`.
    pub fn other_errors(&self) -> impl Iterator<Item = &GraphQlError> {
        self.errors.iter().filter(|e| !e.is_not_found())
    }

    fn has_data(&self) -> bool {
        self.data.as_ref().is_some_and(|d| !d.is_null())
    }
}

/// A GraphQL body with no data whose errors include `RATE_LIMITED`.
fn graphql_rate_limited(url: &str, value: &Value) -> Option<GateError> {
    let has_data = value.get("data").is_some_and(|d| !d.is_null());
    let limited = value
        .get("errors")
        .and_then(Value::as_array)
        .is_some_and(|errors| {
            errors
                .iter()
                .any(|e| e.get("type").and_then(Value::as_str) == Some("RATE_LIMITED"))
        });
    (!has_data && limited).then(|| GateError::RateLimited {
        url: url.to_string(),
        attempts: 1,
    })
}

// ============================================================================
// RequestGate
// ============================================================================

pub struct RequestGate {
    client: Client,
    config: GateConfig,
    blocked_until: Mutex<Option<Instant>>,
    request_count: AtomicU64,
    rate_limit_remaining: AtomicI64,
}

impl RequestGate {
    pub fn new(config: GateConfig) -> Result<Self, GateError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GateError::Network {
                url: String::new(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            config,
            blocked_until: Mutex::new(None),
            request_count: AtomicU64::new(0),
            rate_limit_remaining: AtomicI64::new(-1),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Responses received so far (any status).
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Last `X-RateLimit-Remaining` seen, if any.
    pub fn rate_limit_remaining(&self) -> Option<u64> {
        u64::try_from(self.rate_limit_remaining.load(Ordering::Relaxed)).ok()
    }

    pub async fn get_json(&self, url: &str, accept: Option<&str>) -> Result<Value, GateError> {
        let accept = accept.unwrap_or(GITHUB_JSON);
        self.execute(url, || self.request(Method::GET, url, accept), |_| None)
            .await
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        accept: Option<&str>,
    ) -> Result<T, GateError> {
        let value = self.get_json(url, accept).await?;
        serde_json::from_value(value).map_err(|e| GateError::Malformed {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// POST a GraphQL query. Per-field `NOT_FOUND` errors are returned inside
    /// an `Ok` response; only a response with no data at all fails the batch.
    pub async fn post_graphql(&self, url: &str, query: &str) -> Result<GraphQlResponse, GateError> {
        let body = serde_json::json!({ "query": query });
        let value = self
            .execute(
                url,
                || {
                    self.request(Method::POST, url, "application/json")
                        .json(&body)
                },
                |value| graphql_rate_limited(url, value),
            )
            .await?;

        let response: GraphQlResponse =
            serde_json::from_value(value).map_err(|e| GateError::Malformed {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !response.has_data() {
            let message = response
                .errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "empty GraphQL response".to_string());
            return Err(GateError::Malformed {
                url: url.to_string(),
                message,
            });
        }

        Ok(response)
    }

    fn request(&self, method: Method, url: &str, accept: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, accept);
        match &self.config.token {
            Some(token) => builder.header(reqwest::header::AUTHORIZATION, format!("token {}", token)),
            None => builder,
        }
    }

    /// Cooldown delays for successive rate-limit responses: starts at the
    /// configured cooldown, doubles, capped, each jittered into `[d/2, d)`.
    fn backoff(&self) -> impl Iterator<Item = Duration> {
        let first_ms = u64::try_from(self.config.cooldown.as_millis()).unwrap_or(u64::MAX);
        ExponentialBackoff::from_millis(2)
            .factor((first_ms / 2).max(1))
            .max_delay(self.config.max_cooldown.max(Duration::from_millis(2)))
            .map(|d| d / 2 + jitter(d / 2))
            .take(self.config.max_retries)
    }

    /// Sends with cooldown and bounded retry. `rate_limited` flags 200 bodies
    /// that still report a rate limit (GraphQL).
    async fn execute<F, C>(&self, url: &str, make_request: F, rate_limited: C) -> Result<Value, GateError>
    where
        F: Fn() -> RequestBuilder,
        C: Fn(&Value) -> Option<GateError>,
    {
        let mut delays = self.backoff();
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            self.wait_for_cooldown().await;
            if !self.config.pre_request_delay.is_zero() {
                tokio::time::sleep(self.config.pre_request_delay).await;
            }

            let outcome = self
                .send_once(url, make_request())
                .await
                .and_then(|value| match rate_limited(&value) {
                    Some(err) => Err(err),
                    None => Ok(value),
                });

            match outcome {
                Err(GateError::RateLimited { .. }) => match delays.next() {
                    Some(delay) => {
                        tracing::warn!(
                            gate = %self.config.name,
                            url,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Rate limited — cooling down before retry"
                        );
                        self.enter_cooldown(delay).await;
                    }
                    None => {
                        tracing::error!(
                            gate = %self.config.name,
                            url,
                            attempts = attempt,
                            "Rate limit retries exhausted"
                        );
                        return Err(GateError::RateLimited {
                            url: url.to_string(),
                            attempts: attempt,
                        });
                    }
                },
                other => return other,
            }
        }
    }

    async fn send_once(&self, url: &str, request: RequestBuilder) -> Result<Value, GateError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GateError::Timeout {
                    url: url.to_string(),
                }
            } else {
                GateError::Network {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        self.request_count.fetch_add(1, Ordering::Relaxed);
        if let Some(remaining) = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
        {
            self.rate_limit_remaining.store(remaining, Ordering::Relaxed);
        }

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| GateError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if let Some(err) = classify_status(status, url, &body) {
            tracing::debug!(gate = %self.config.name, url, status, "GitHub request failed");
            return Err(err);
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| GateError::Malformed {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn wait_for_cooldown(&self) {
        let until = *self.blocked_until.lock().await;
        if let Some(until) = until {
            if until > Instant::now() {
                tokio::time::sleep_until(until).await;
            }
        }
    }

    async fn enter_cooldown(&self, delay: Duration) {
        let candidate = Instant::now() + delay;
        let mut blocked = self.blocked_until.lock().await;
        if blocked.map_or(true, |current| current < candidate) {
            *blocked = Some(candidate);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_gate(max_retries: usize) -> RequestGate {
        RequestGate::new(GateConfig {
            name: "test".to_string(),
            token: Some("test-token".to_string()),
            timeout: Duration::from_secs(5),
            cooldown: Duration::from_millis(4),
            max_cooldown: Duration::from_millis(20),
            max_retries,
            pre_request_delay: Duration::ZERO,
        })
        .expect("Failed to create gate")
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(200, "u", ""), None);
        assert!(matches!(
            classify_status(404, "u", ""),
            Some(GateError::NotFound { .. })
        ));
        assert!(matches!(
            classify_status(403, "u", ""),
            Some(GateError::RateLimited { .. })
        ));
        assert!(matches!(
            classify_status(429, "u", ""),
            Some(GateError::RateLimited { .. })
        ));
        match classify_status(422, "u", r#"{"message":"Validation Failed"}"#) {
            Some(GateError::Malformed { message, .. }) => assert_eq!(message, "Validation Failed"),
            other => panic!("Expected Malformed, got {:?}", other),
        }
        assert!(matches!(
            classify_status(502, "u", ""),
            Some(GateError::Network { .. })
        ));
    }

    #[test]
    fn test_backoff_is_capped_and_bounded() {
        let gate = test_gate(5);
        let delays: Vec<Duration> = gate.backoff().collect();
        assert_eq!(delays.len(), 5);
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_get_json_sends_token_and_accept_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/pulls/1"))
            .and(header("authorization", "token test-token"))
            .and(header("accept", GITHUB_JSON))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ratelimit-remaining", "4999")
                    .set_body_json(serde_json::json!({"number": 1})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let gate = test_gate(2);
        let url = format!("{}/repos/o/r/pulls/1", server.uri());
        let value = gate.get_json(&url, None).await.unwrap();

        assert_eq!(value["number"], 1);
        assert_eq!(gate.request_count(), 1);
        assert_eq!(gate.rate_limit_remaining(), Some(4999));
    }

    #[tokio::test]
    async fn test_404_is_not_found_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let gate = test_gate(3);
        let result = gate.get_json(&format!("{}/x", server.uri()), None).await;
        assert!(matches!(result, Err(GateError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_403_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let gate = test_gate(3);
        let value = gate
            .get_json(&format!("{}/x", server.uri()), None)
            .await
            .expect("Expected success after cooldown");
        assert_eq!(value["ok"], true);
        assert_eq!(gate.request_count(), 2);
    }

    #[tokio::test]
    async fn test_persistent_403_surfaces_rate_limited_after_cap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(3)
            .mount(&server)
            .await;

        let gate = test_gate(2);
        let result = gate.get_json(&format!("{}/x", server.uri()), None).await;
        match result {
            Err(GateError::RateLimited { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("Expected RateLimited, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_422_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(422)
                    .set_body_json(serde_json::json!({"message": "Validation Failed"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let gate = test_gate(3);
        let result = gate.get_json(&format!("{}/search", server.uri()), None).await;
        match result {
            Err(GateError::Malformed { message, .. }) => assert_eq!(message, "Validation Failed"),
            other => panic!("Expected Malformed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_500_is_network_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let gate = test_gate(3);
        let result = gate.get_json(&format!("{}/x", server.uri()), None).await;
        assert!(matches!(result, Err(GateError::Network { .. })));
    }

    #[tokio::test]
    async fn test_graphql_tolerates_not_found_alias() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "r0": { "nameWithOwner": "foo/bar", "stargazerCount": 12 },
                    "r1": null
                },
                "errors": [
                    { "type": "NOT_FOUND", "path": ["r1"], "message": "Could not resolve to a Repository" }
                ]
            })))
            .mount(&server)
            .await;

        let gate = test_gate(1);
        let response = gate
            .post_graphql(&format!("{}/graphql", server.uri()), "query { }")
            .await
            .expect("Partial NOT_FOUND must not fail the batch");

        assert!(response.field("r0").is_some());
        assert!(response.field("r1").is_none());
        assert!(response.not_found_aliases().contains("r1"));
        assert_eq!(response.other_errors().count(), 0);
    }

    #[tokio::test]
    async fn test_graphql_rate_limited_body_cools_down_and_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errors": [{ "type": "RATE_LIMITED", "message": "API rate limit exceeded" }]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "r0": { "nameWithOwner": "foo/bar", "stargazerCount": 3 } }
            })))
            .mount(&server)
            .await;

        let gate = test_gate(2);
        let response = gate
            .post_graphql(&format!("{}/graphql", server.uri()), "query { }")
            .await
            .expect("Expected success after cooldown");

        assert!(response.field("r0").is_some());
        assert_eq!(gate.request_count(), 2);
    }

    #[tokio::test]
    async fn test_persistent_graphql_rate_limit_surfaces_after_cap() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": null,
                "errors": [{ "type": "RATE_LIMITED", "message": "API rate limit exceeded" }]
            })))
            .expect(3)
            .mount(&server)
            .await;

        let gate = test_gate(2);
        match gate.post_graphql(&format!("{}/graphql", server.uri()), "query { }").await {
            Err(GateError::RateLimited { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("Expected RateLimited, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_graphql_without_data_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": null,
                "errors": [{ "type": "INTERNAL", "message": "Something went wrong" }]
            })))
            .mount(&server)
            .await;

        let gate = test_gate(1);
        let result = gate
            .post_graphql(&format!("{}/graphql", server.uri()), "query { }")
            .await;
        match result {
            Err(GateError::Malformed { message, .. }) => assert_eq!(message, "Something went wrong"),
            other => panic!("Expected Malformed, got {:?}", other),
        }
    }
}
