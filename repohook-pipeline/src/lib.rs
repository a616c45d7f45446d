//! Linkage resolution and the filter/classify pipeline.
//!
//! - [`github`] — typed GitHub REST/GraphQL client over the request gates
//! - [`adapters`] — independent evidence sources for issues and repositories
//! - [`resolver`] — per-item predicate chains producing a [`Verdict`]
//! - [`pipeline`] — bounded concurrent (or sequential) filter over many items
//! - [`classify_gate`] — sequential, paced yes/no classification of survivors
//! - [`awesome`] — repository lists extracted from awesome-list READMEs
//! - [`runs`] — the issue, archive and awesome-list mining runs
//!
//! [`Verdict`]: repohook_core::Verdict

pub mod adapters;
pub mod awesome;
pub mod classify_gate;
pub mod context;
pub mod github;
pub mod pipeline;
pub mod resolver;
pub mod runs;

pub use awesome::AwesomeExtractor;
pub use classify_gate::{ClassificationGate, ClassificationPrompt, IssuePrompt, PromptSource, RepoPrompt};
pub use context::{ProgressReporter, PullRequestLookup, RepositorySource, RunContext};
pub use github::GitHubClient;
pub use pipeline::{FilterPipeline, ItemResolver, PipelineItem, Resolved};
pub use resolver::{IssueResolver, RepoResolver};
pub use runs::{mine_archive, mine_awesome, mine_issues, ArchiveRun, AwesomeRun, IssueRun};
