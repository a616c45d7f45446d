//! Per-run state shared by every worker of one pipeline run.
//!
//! Nothing here is global: a [`RunContext`] is created at the start of a run,
//! passed by `Arc` into resolvers and adapters, and dropped with the run.

use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use repohook_core::{GateError, PullRequestRecord, RepositoryCandidate, Verdict};
use uuid::Uuid;

// ============================================================================
// Lookup seams
// ============================================================================

#[async_trait]
pub trait PullRequestLookup: Send + Sync {
    /// `Ok(None)` when the pull request does not exist.
    async fn pull_request(&self, repo: &str, number: u64) -> Result<Option<PullRequestRecord>, GateError>;
}

#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// `Ok(None)` when the repository does not exist.
    async fn repository(&self, full_name: &str) -> Result<Option<RepositoryCandidate>, GateError>;

    /// Decoded README cut to `char_budget` characters; `Ok(None)` when absent.
    async fn readme(&self, full_name: &str, char_budget: usize) -> Result<Option<String>, GateError>;
}

// ============================================================================
// Progress
// ============================================================================

/// Lock-guarded progress lines, one per finished item.
pub struct ProgressReporter {
    out: Mutex<Box<dyn Write + Send>>,
    done: AtomicUsize,
    total: AtomicUsize,
}

impl ProgressReporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            done: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
        }
    }

    pub fn stderr() -> Self {
        Self::new(Box::new(io::stderr()))
    }

    pub fn silent() -> Self {
        Self::new(Box::new(io::sink()))
    }

    /// Reset counters for a new phase of `total` items.
    pub fn start(&self, total: usize) {
        self.done.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }

    pub fn item(&self, key: &str, verdict: &Verdict) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        let total = self.total.load(Ordering::SeqCst);
        let mark = if verdict.is_accept() { '+' } else { '-' };
        self.line(&format!("[{}/{}] {} {} ({})", done, total, mark, key, verdict.reason));
    }

    /// Writes one whole line under the lock. Output failures are ignored.
    pub fn line(&self, text: &str) {
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{}", text);
            let _ = out.flush();
        }
    }
}

// ============================================================================
// RunContext
// ============================================================================

pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    repositories: DashMap<String, Option<RepositoryCandidate>>,
    pull_requests: DashMap<(String, u64), Option<PullRequestRecord>>,
    progress: ProgressReporter,
}

impl RunContext {
    pub fn new(progress: ProgressReporter) -> Self {
        let run_id = Uuid::new_v4();
        tracing::debug!(run_id = %run_id, "Run context created");
        Self {
            run_id,
            started_at: Utc::now(),
            repositories: DashMap::new(),
            pull_requests: DashMap::new(),
            progress,
        }
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    /// Cached repository info, if already looked up.
    pub fn cached_repository(&self, full_name: &str) -> Option<Option<RepositoryCandidate>> {
        self.repositories.get(full_name).map(|entry| entry.value().clone())
    }

    pub fn cache_repository(&self, full_name: &str, info: Option<RepositoryCandidate>) {
        self.repositories.insert(full_name.to_string(), info);
    }

    pub fn cached_repository_count(&self) -> usize {
        self.repositories.len()
    }

    /// Repository info through the cache. Lookup errors are logged, not cached.
    pub async fn repository(&self, source: &dyn RepositorySource, full_name: &str) -> Option<RepositoryCandidate> {
        if let Some(hit) = self.cached_repository(full_name) {
            return hit;
        }
        match source.repository(full_name).await {
            Ok(info) => {
                self.cache_repository(full_name, info.clone());
                info
            }
            Err(e) => {
                tracing::warn!(repo = full_name, error = %e, "Repository lookup failed");
                None
            }
        }
    }

    /// Pull request record through the cache. Lookup errors are logged, not cached.
    pub async fn pull_request(
        &self,
        lookup: &dyn PullRequestLookup,
        repo: &str,
        number: u64,
    ) -> Option<PullRequestRecord> {
        let key = (repo.to_string(), number);
        if let Some(hit) = self.pull_requests.get(&key).map(|entry| entry.value().clone()) {
            return hit;
        }
        match lookup.pull_request(repo, number).await {
            Ok(record) => {
                self.pull_requests.insert(key, record.clone());
                record
            }
            Err(e) => {
                tracing::warn!(repo, pr = number, error = %e, "Pull request lookup failed");
                None
            }
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(ProgressReporter::silent())
    }
}

/// Shared in-memory writer for asserting on progress output.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(pub std::sync::Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[cfg(test)]
impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
