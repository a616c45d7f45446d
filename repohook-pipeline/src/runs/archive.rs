use std::path::PathBuf;
use std::sync::Arc;

use repohook_core::keywords::KeywordMatcher;
use repohook_core::models::snapshot::{ArchiveSnapshot, RepoStars};
use repohook_core::{EvidenceKind, RepohookConfig, RepositoryCandidate};
use repohook_ingest::{extract_candidates, read_event_file, EventWindow};

use crate::adapters::{KeywordAdapter, RepoInfoAdapter};
use crate::classify_gate::{ClassificationGate, RepoPrompt};
use crate::context::{RepositorySource, RunContext};
use crate::github::GitHubClient;
use crate::pipeline::{FilterPipeline, Resolved};
use crate::resolver::RepoResolver;

#[derive(Debug, Clone)]
pub struct ArchiveRun {
    /// Hourly event files (JSON lines), already on disk.
    pub event_files: Vec<PathBuf>,
    /// Keep only events inside this window.
    pub window: Option<EventWindow>,
    pub window_hours: Option<u32>,
    pub limit: Option<usize>,
    /// `YYYY-MM-DD` stamped into the snapshot.
    pub date: String,
}

/// Agent repositories active in the given archive events, most-starred first.
pub async fn mine_archive(
    config: &RepohookConfig,
    client: Arc<GitHubClient>,
    gate: Option<&ClassificationGate>,
    run: &ArchiveRun,
    ctx: Arc<RunContext>,
) -> anyhow::Result<ArchiveSnapshot> {
    let mut events = Vec::new();
    for file in &run.event_files {
        match read_event_file(file) {
            Ok(mut batch) => events.append(&mut batch),
            Err(e) => tracing::warn!(file = %file.display(), error = %e, "Skipping event file"),
        }
    }
    if let Some(window) = &run.window {
        events = window.filter(events);
    }
    let total_events = events.len();

    let candidates: Vec<RepositoryCandidate> = extract_candidates(&events)
        .into_iter()
        .map(|repo| repo.candidate)
        .collect();
    let total_repos = candidates.len();
    ctx.progress().line(&format!(
        "{} events, {} distinct repositories",
        total_events, total_repos
    ));

    let filter = &config.repository_filter;
    if filter.min_stars > 0 && !candidates.is_empty() {
        let names: Vec<String> = candidates.iter().map(|c| c.full_name.clone()).collect();
        let report = RepoInfoAdapter::new(client.clone(), &config.github)
            .prefetch(&ctx, &names)
            .await;
        tracing::info!(?report, "Repository info prefetched");
    }

    let source: Arc<dyn RepositorySource> = client.clone();
    let resolver = Arc::new(RepoResolver::new(
        KeywordAdapter::new(
            KeywordMatcher::new(&filter.keywords),
            source.clone(),
            filter.readme_char_budget,
        ),
        KeywordMatcher::new(&filter.excluded_terms),
        filter.min_stars,
        source.clone(),
        ctx.clone(),
    ));
    let pipeline = FilterPipeline::from_config(&config.pipeline, ctx.clone());
    let mut survivors = pipeline.filter(candidates, resolver).await;

    if let Some(gate) = gate {
        let prompts = RepoPrompt::new(
            source,
            ctx.clone(),
            config.classifier.definition.clone(),
            config.classifier.context_char_budget,
        );
        ctx.progress().line(&format!("Classifying {} repositories", survivors.len()));
        survivors = gate.classify_batch(survivors, &prompts).await;
    }

    let mut agent_repos: Vec<RepoStars> = survivors
        .iter()
        .map(|resolved| RepoStars {
            name: resolved.item.full_name.clone(),
            stars: known_stars(resolved, &ctx),
        })
        .collect();
    agent_repos.sort_by(|a, b| b.stars.cmp(&a.stars).then_with(|| a.name.cmp(&b.name)));
    if let Some(limit) = run.limit {
        agent_repos.truncate(limit);
    }

    tracing::info!(
        run_id = %ctx.run_id,
        total_repos,
        agent_repos = agent_repos.len(),
        "Archive mining finished"
    );

    Ok(ArchiveSnapshot {
        date: run.date.clone(),
        time_window_hours: run.window_hours,
        total_events,
        total_repos,
        agent_repos_count: agent_repos.len(),
        used_ai_filter: gate.is_some(),
        min_stars: filter.min_stars,
        agent_repos,
    })
}

/// Stars recorded as evidence, else from the run cache, else 0.
fn known_stars(resolved: &Resolved<RepositoryCandidate>, ctx: &RunContext) -> u64 {
    resolved
        .verdict
        .evidence
        .iter()
        .find_map(|e| match e.kind {
            EvidenceKind::StarCount { stars } => Some(stars),
            _ => None,
        })
        .or(resolved.item.stars)
        .or_else(|| {
            ctx.cached_repository(&resolved.item.full_name)
                .flatten()
                .and_then(|info| info.stars)
        })
        .unwrap_or(0)
}
