use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use repohook_core::keywords::KeywordMatcher;
use repohook_core::models::snapshot::{AwesomeRepo, AwesomeSnapshot};
use repohook_core::RepohookConfig;

use crate::awesome::{search_query, AwesomeExtractor};
use crate::context::RunContext;
use crate::github::GitHubClient;

#[derive(Debug, Clone)]
pub struct AwesomeRun {
    pub limit: Option<usize>,
    /// `YYYY-MM-DD` stamped into the snapshot.
    pub date: String,
}

/// Agent repositories collected from the READMEs of popular awesome lists.
pub async fn mine_awesome(
    config: &RepohookConfig,
    client: Arc<GitHubClient>,
    extractor: &AwesomeExtractor,
    run: &AwesomeRun,
    ctx: Arc<RunContext>,
) -> anyhow::Result<AwesomeSnapshot> {
    let settings = &config.awesome;
    let excluded = KeywordMatcher::new(&config.repository_filter.excluded_terms);

    let mut seen = BTreeSet::new();
    let mut awesome_repos = Vec::new();
    for keyword in &settings.search_keywords {
        let query = search_query(keyword, settings.min_stars);
        let found = match client
            .search_repositories(&query, settings.max_repos_per_keyword)
            .await
        {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(keyword = %keyword, error = %e, "Awesome search failed");
                continue;
            }
        };
        ctx.progress().line(&format!("'{}': {} awesome lists", keyword, found.len()));

        for repo in found {
            let text = format!("{} {}", repo.full_name, repo.description_or_empty());
            if excluded.first_match(&text).is_some() {
                continue;
            }
            if seen.insert(repo.full_name.clone()) {
                awesome_repos.push(AwesomeRepo {
                    description: repo.description_or_empty().to_string(),
                    stars: repo.stars.unwrap_or(0),
                    name: repo.full_name,
                });
            }
        }
    }

    let mut agent_repos: Vec<String> = Vec::new();
    let mut repo_sources: BTreeMap<String, Vec<String>> = BTreeMap::new();
    ctx.progress().start(awesome_repos.len());

    for awesome in &awesome_repos {
        let readme = match client.fetch_readme(&awesome.name, 0).await {
            Ok(Some(readme)) => readme,
            Ok(None) => {
                tracing::info!(awesome = %awesome.name, "No README; skipping");
                continue;
            }
            Err(e) => {
                tracing::warn!(awesome = %awesome.name, error = %e, "README fetch failed; skipping");
                continue;
            }
        };

        let extracted = extractor.extract(&awesome.name, &readme).await;
        ctx.progress().line(&format!("{}: {} repositories", awesome.name, extracted.len()));

        for repo in extracted {
            let sources = repo_sources.entry(repo.clone()).or_default();
            if sources.is_empty() {
                agent_repos.push(repo);
            }
            if !sources.contains(&awesome.name) {
                sources.push(awesome.name.clone());
            }
        }
    }

    if let Some(limit) = run.limit {
        agent_repos.truncate(limit);
        let kept: BTreeSet<&String> = agent_repos.iter().collect();
        repo_sources.retain(|name, _| kept.contains(name));
    }

    tracing::info!(
        run_id = %ctx.run_id,
        awesome_repos = awesome_repos.len(),
        agent_repos = agent_repos.len(),
        "Awesome mining finished"
    );

    Ok(AwesomeSnapshot {
        date: run.date.clone(),
        search_keywords: settings.search_keywords.clone(),
        min_stars: settings.min_stars,
        awesome_repos_count: awesome_repos.len(),
        agent_repos_count: agent_repos.len(),
        awesome_repos,
        agent_repos,
        repo_sources,
    })
}
