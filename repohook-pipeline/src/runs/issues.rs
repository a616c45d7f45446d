use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use repohook_core::models::snapshot::{AcceptedIssue, IssueSnapshot};
use repohook_core::RepohookConfig;

use crate::adapters::issue_adapters;
use crate::classify_gate::{ClassificationGate, IssuePrompt};
use crate::context::RunContext;
use crate::github::GitHubClient;
use crate::pipeline::FilterPipeline;
use crate::resolver::IssueResolver;

#[derive(Debug, Clone)]
pub struct IssueRun {
    /// `owner/name`.
    pub repo: String,
    pub limit: Option<usize>,
    /// Local clone for the git-log adapter.
    pub clone_dir: Option<PathBuf>,
}

/// `<issue_dir>/<owner>-<name>-<YYYYMMDD>/issue.json`
pub fn issue_snapshot_path(issue_dir: &Path, repo: &str, at: DateTime<Utc>) -> PathBuf {
    issue_dir
        .join(format!("{}-{}", repo.replace('/', "-"), at.format("%Y%m%d")))
        .join("issue.json")
}

/// Closed issues of one repository whose fix was merged to the default
/// branch, optionally narrowed further by the classification gate.
pub async fn mine_issues(
    config: &RepohookConfig,
    client: Arc<GitHubClient>,
    gate: Option<&ClassificationGate>,
    run: &IssueRun,
    ctx: Arc<RunContext>,
) -> anyhow::Result<IssueSnapshot> {
    let issues = client
        .closed_issues(&run.repo, run.limit)
        .await
        .with_context(|| format!("Failed to list closed issues of {}", run.repo))?;
    tracing::info!(repo = %run.repo, count = issues.len(), "Closed issues listed");

    let adapters = issue_adapters(
        &config.pipeline.adapters,
        &run.repo,
        client.clone(),
        run.clone_dir.as_deref(),
    );
    if adapters.is_empty() {
        anyhow::bail!("No issue evidence adapters enabled");
    }

    let resolver = Arc::new(IssueResolver::new(&run.repo, adapters, client.clone(), ctx.clone()));
    let pipeline = FilterPipeline::from_config(&config.pipeline, ctx.clone());
    let mut survivors = pipeline.filter(issues, resolver).await;

    if let Some(gate) = gate {
        let prompts = IssuePrompt::new(
            config.classifier.issue_definition.clone(),
            config.classifier.context_char_budget,
        );
        ctx.progress().line(&format!("Classifying {} linked issues", survivors.len()));
        survivors = gate.classify_batch(survivors, &prompts).await;
    }

    let issues: Vec<AcceptedIssue> = survivors
        .into_iter()
        .map(|resolved| AcceptedIssue {
            issue: resolved.item,
            merged_prs: resolved.verdict.merged_prs,
            evidence_sources_used: resolved.verdict.evidence_sources_used,
            confidence: resolved.verdict.confidence,
        })
        .collect();

    let (rest, search, graphql) = client.request_counts();
    tracing::info!(
        run_id = %ctx.run_id,
        repo = %run.repo,
        accepted = issues.len(),
        rest_requests = rest,
        search_requests = search,
        graphql_requests = graphql,
        "Issue mining finished"
    );

    Ok(IssueSnapshot {
        repo: run.repo.clone(),
        crawl_time: Utc::now(),
        total_count: issues.len(),
        issues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use repohook_core::config::{ExecutionMode, IssueAdapterKind};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_issue_snapshot_path() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(
            issue_snapshot_path(Path::new("data/hooked_issue"), "foo/bar", at),
            PathBuf::from("data/hooked_issue/foo-bar-20240309/issue.json")
        );
    }

    #[tokio::test]
    async fn test_mine_issues_timeline_only() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/o/r/issues"))
            .and(query_param("state", "closed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "number": 1, "title": "crash", "body": "stack trace", "state": "closed" },
                { "number": 2, "title": "empty", "body": "", "state": "closed" },
                { "number": 3, "title": "a PR", "body": "x", "state": "closed", "pull_request": {} }
            ])))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/repos/o/r/issues/1/timeline"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "event": "cross-referenced",
                  "source": { "issue": { "number": 17, "pull_request": {} } } }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/repos/o/r/pulls/17"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "number": 17, "state": "closed", "title": "fix crash",
                "html_url": "https://github.com/o/r/pull/17",
                "merged": true, "base": { "ref": "main" }
            })))
            .mount(&server)
            .await;

        let mut config = RepohookConfig::default();
        config.github.token = Some("t".to_string());
        config.github.search_delay_ms = 0;
        config.pipeline.adapters = vec![IssueAdapterKind::Timeline];
        config.pipeline.mode = ExecutionMode::Sequential;

        let client = Arc::new(GitHubClient::with_base_url(&config.github, server.uri()).unwrap());
        let run = IssueRun {
            repo: "o/r".to_string(),
            limit: None,
            clone_dir: None,
        };

        let snapshot = mine_issues(&config, client, None, &run, Arc::new(RunContext::default()))
            .await
            .unwrap();

        assert_eq!(snapshot.total_count, 1);
        assert_eq!(snapshot.issues[0].issue.number, 1);
        assert_eq!(snapshot.issues[0].merged_prs[0].number, 17);
        assert_eq!(
            snapshot.issues[0].confidence,
            repohook_core::EvidenceConfidence::ApiOnly
        );
    }
}
