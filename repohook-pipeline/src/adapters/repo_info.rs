use std::sync::Arc;

use futures::stream::{self, StreamExt};
use repohook_core::config::GitHubConfig;

use crate::context::RunContext;
use crate::github::GitHubClient;

/// GitHub caps aliased sub-queries per request well above this; 50 keeps
/// each query's cost small.
const MAX_BATCH: usize = 50;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PrefetchReport {
    pub requested: usize,
    pub already_cached: usize,
    pub from_batch: usize,
    pub from_fallback: usize,
    pub unavailable: usize,
}

/// Fills the run's repository cache: one GraphQL query per batch, REST for
/// whatever a batch could not answer.
pub struct RepoInfoAdapter {
    client: Arc<GitHubClient>,
    batch_size: usize,
    fallback_workers: usize,
}

impl RepoInfoAdapter {
    pub fn new(client: Arc<GitHubClient>, config: &GitHubConfig) -> Self {
        Self {
            client,
            batch_size: config.graphql_batch_size.clamp(1, MAX_BATCH),
            fallback_workers: config.fallback_workers.max(1),
        }
    }

    pub async fn prefetch(&self, ctx: &RunContext, names: &[String]) -> PrefetchReport {
        let mut report = PrefetchReport {
            requested: names.len(),
            ..PrefetchReport::default()
        };

        let pending: Vec<String> = names
            .iter()
            .filter(|name| ctx.cached_repository(name).is_none())
            .cloned()
            .collect();
        report.already_cached = names.len() - pending.len();

        let mut fallback = Vec::new();
        for chunk in pending.chunks(self.batch_size) {
            match self.client.repositories_batch(chunk).await {
                Ok(lookup) => {
                    report.from_batch += lookup.found.len();
                    for (name, info) in lookup.found {
                        ctx.cache_repository(&name, Some(info));
                    }
                    for name in lookup.invalid {
                        ctx.cache_repository(&name, None);
                        report.unavailable += 1;
                    }
                    fallback.extend(lookup.not_found);
                    fallback.extend(lookup.unresolved);
                }
                Err(e) => {
                    tracing::warn!(size = chunk.len(), error = %e, "GraphQL batch failed; falling back to REST");
                    fallback.extend(chunk.iter().cloned());
                }
            }
        }

        if !fallback.is_empty() {
            tracing::info!(count = fallback.len(), workers = self.fallback_workers, "REST fallback for repository info");
            let source = self.client.as_ref();
            let results: Vec<bool> = stream::iter(fallback)
                .map(|name| async move { ctx.repository(source, &name).await.is_some() })
                .buffer_unordered(self.fallback_workers)
                .collect()
                .await;
            for found in results {
                if found {
                    report.from_fallback += 1;
                } else {
                    report.unavailable += 1;
                }
            }
        }

        tracing::info!(
            requested = report.requested,
            cached = report.already_cached,
            batch = report.from_batch,
            fallback = report.from_fallback,
            unavailable = report.unavailable,
            "Repository info prefetched"
        );
        report
    }
}
