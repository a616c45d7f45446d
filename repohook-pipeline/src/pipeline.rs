//! Concurrent filter pipeline.
//!
//! - Concurrent mode: at most `workers` items in flight, each resolved by its
//!   own task; tasks send results over a channel to a single collector.
//! - Sequential mode: one item at a time, for API-only runs sharing one quota.
//!
//! A resolver error or panic rejects that item with `"error: <message>"` and
//! never touches its siblings. Results are sorted by item key in both modes.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use repohook_core::config::{ExecutionMode, PipelineConfig};
use repohook_core::{Issue, RepositoryCandidate, Verdict};
use tokio::sync::{mpsc, Semaphore};

use crate::context::RunContext;

// ============================================================================
// Items and resolvers
// ============================================================================

pub trait PipelineItem: Clone + Send + Sync + 'static {
    type Key: Ord + Clone + Send + fmt::Display;

    fn key(&self) -> Self::Key;

    /// Progress label.
    fn label(&self) -> String {
        self.key().to_string()
    }
}

impl PipelineItem for Issue {
    type Key = u64;

    fn key(&self) -> u64 {
        self.number
    }

    fn label(&self) -> String {
        format!("#{}", self.number)
    }
}

impl PipelineItem for RepositoryCandidate {
    type Key = String;

    fn key(&self) -> String {
        self.full_name.clone()
    }
}

#[async_trait]
pub trait ItemResolver<T>: Send + Sync {
    async fn resolve(&self, item: &T) -> anyhow::Result<Verdict>;
}

#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub item: T,
    pub verdict: Verdict,
}

// ============================================================================
// FilterPipeline
// ============================================================================

pub struct FilterPipeline {
    mode: ExecutionMode,
    workers: usize,
    ctx: Arc<RunContext>,
}

impl FilterPipeline {
    pub fn new(mode: ExecutionMode, workers: usize, ctx: Arc<RunContext>) -> Self {
        Self {
            mode,
            workers: workers.max(1),
            ctx,
        }
    }

    pub fn from_config(config: &PipelineConfig, ctx: Arc<RunContext>) -> Self {
        Self::new(config.mode, config.workers, ctx)
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Every item with its verdict, sorted by item key.
    pub async fn evaluate<T, R>(&self, items: Vec<T>, resolver: Arc<R>) -> Vec<Resolved<T>>
    where
        T: PipelineItem,
        R: ItemResolver<T> + ?Sized + 'static,
    {
        self.ctx.progress().start(items.len());
        tracing::info!(
            run_id = %self.ctx.run_id,
            items = items.len(),
            mode = ?self.mode,
            workers = self.workers,
            "Pipeline started"
        );

        let mut results = match self.mode {
            ExecutionMode::Concurrent => self.run_concurrent(items, resolver).await,
            ExecutionMode::Sequential => self.run_sequential(items, resolver.as_ref()).await,
        };
        results.sort_by_key(|r| r.item.key());

        let accepted = results.iter().filter(|r| r.verdict.is_accept()).count();
        tracing::info!(
            run_id = %self.ctx.run_id,
            total = results.len(),
            accepted,
            "Pipeline finished"
        );
        results
    }

    /// Accepted items only, sorted by item key.
    pub async fn filter<T, R>(&self, items: Vec<T>, resolver: Arc<R>) -> Vec<Resolved<T>>
    where
        T: PipelineItem,
        R: ItemResolver<T> + ?Sized + 'static,
    {
        self.evaluate(items, resolver)
            .await
            .into_iter()
            .filter(|r| r.verdict.is_accept())
            .collect()
    }

    async fn run_concurrent<T, R>(&self, items: Vec<T>, resolver: Arc<R>) -> Vec<Resolved<T>>
    where
        T: PipelineItem,
        R: ItemResolver<T> + ?Sized + 'static,
    {
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let (tx, mut rx) = mpsc::unbounded_channel();

        for item in items {
            // Waiting here keeps at most `workers` tasks alive at once.
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let tx = tx.clone();
            let resolver = resolver.clone();
            let ctx = self.ctx.clone();

            tokio::spawn(async move {
                let _permit = permit;
                let verdict = resolve_guarded(resolver.as_ref(), &item).await;
                ctx.progress().item(&item.label(), &verdict);
                let _ = tx.send(Resolved { item, verdict });
            });
        }
        drop(tx);

        let mut results = Vec::with_capacity(total);
        while let Some(resolved) = rx.recv().await {
            results.push(resolved);
        }
        if results.len() < total {
            tracing::error!(
                expected = total,
                collected = results.len(),
                "Some pipeline tasks ended without a result"
            );
        }
        results
    }

    async fn run_sequential<T, R>(&self, items: Vec<T>, resolver: &R) -> Vec<Resolved<T>>
    where
        T: PipelineItem,
        R: ItemResolver<T> + ?Sized,
    {
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let verdict = resolve_guarded(resolver, &item).await;
            self.ctx.progress().item(&item.label(), &verdict);
            results.push(Resolved { item, verdict });
        }
        results
    }
}

/// Runs one resolver call, turning errors and panics into rejections.
async fn resolve_guarded<T, R>(resolver: &R, item: &T) -> Verdict
where
    T: PipelineItem,
    R: ItemResolver<T> + ?Sized,
{
    match AssertUnwindSafe(resolver.resolve(item)).catch_unwind().await {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(e)) => {
            tracing::warn!(item = %item.label(), error = %e, "Item failed");
            Verdict::error(e)
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!(item = %item.label(), panic = %message, "Item worker panicked");
            Verdict::error(message)
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ProgressReporter, SharedBuffer};
    use repohook_core::Decision;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn issue(number: u64) -> Issue {
        Issue {
            number,
            title: format!("Issue {}", number),
            body: Some("body".to_string()),
            state: "closed".to_string(),
            created_at: None,
            updated_at: None,
            closed_at: None,
            labels: Vec::new(),
            html_url: String::new(),
        }
    }

    /// Even numbers pass; 3 errors; 5 panics. Later items finish first.
    struct ParityResolver {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ParityResolver {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ItemResolver<Issue> for ParityResolver {
        async fn resolve(&self, item: &Issue) -> anyhow::Result<Verdict> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5 * (10 - item.number.min(10)))).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match item.number {
                3 => anyhow::bail!("timeline exploded"),
                5 => panic!("resolver bug"),
                n if n % 2 == 0 => Ok(Verdict::accept("even")),
                _ => Ok(Verdict::reject("odd")),
            }
        }
    }

    fn pipeline(mode: ExecutionMode, workers: usize) -> (FilterPipeline, SharedBuffer) {
        let buf = SharedBuffer::default();
        let ctx = RunContext::new(ProgressReporter::new(Box::new(buf.clone())));
        (FilterPipeline::new(mode, workers, Arc::new(ctx)), buf)
    }

    #[tokio::test]
    async fn test_concurrent_results_sorted_and_failures_isolated() {
        let (pipeline, buf) = pipeline(ExecutionMode::Concurrent, 3);
        let resolver = ParityResolver::new();
        let items: Vec<Issue> = [6, 1, 5, 3, 2, 4].into_iter().map(issue).collect();

        let results = pipeline.evaluate(items, resolver.clone()).await;

        let keys: Vec<u64> = results.iter().map(|r| r.item.number).collect();
        assert_eq!(keys, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(results[2].verdict.reason, "error: timeline exploded");
        assert_eq!(results[4].verdict.reason, "error: resolver bug");
        assert_eq!(results[4].verdict.decision, Decision::Reject);
        assert!(resolver.max_in_flight.load(Ordering::SeqCst) <= 3);
        assert_eq!(buf.contents().lines().count(), 6);
    }

    #[tokio::test]
    async fn test_filter_keeps_accepted_in_key_order() {
        let (pipeline, _) = pipeline(ExecutionMode::Concurrent, 4);
        let items: Vec<Issue> = [8, 2, 7, 4].into_iter().map(issue).collect();

        let survivors = pipeline.filter(items, ParityResolver::new()).await;
        let keys: Vec<u64> = survivors.iter().map(|r| r.item.number).collect();
        assert_eq!(keys, vec![2, 4, 8]);
    }

    #[tokio::test]
    async fn test_sequential_runs_one_at_a_time() {
        let (pipeline, _) = pipeline(ExecutionMode::Sequential, 8);
        let resolver = ParityResolver::new();
        let items: Vec<Issue> = [4, 3, 2, 1].into_iter().map(issue).collect();

        let results = pipeline.evaluate(items, resolver.clone()).await;

        assert_eq!(resolver.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(results[0].item.number, 1);
        assert_eq!(results[2].verdict.reason, "error: timeline exploded");
    }

    #[tokio::test]
    async fn test_repository_items_sort_by_name() {
        struct AcceptAll;

        #[async_trait]
        impl ItemResolver<RepositoryCandidate> for AcceptAll {
            async fn resolve(&self, _item: &RepositoryCandidate) -> anyhow::Result<Verdict> {
                Ok(Verdict::accept("ok"))
            }
        }

        let (pipeline, buf) = pipeline(ExecutionMode::Concurrent, 2);
        let items = vec![
            RepositoryCandidate::named("zeta/z"),
            RepositoryCandidate::named("alpha/a"),
        ];
        let results = pipeline.filter(items, Arc::new(AcceptAll)).await;

        assert_eq!(results[0].item.full_name, "alpha/a");
        assert!(buf.contents().contains("+ zeta/z (ok)"));
    }
}
