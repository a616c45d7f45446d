//! End-to-end mining runs.
//!
//! Each run works inside one [`RunContext`](crate::RunContext) and returns one
//! complete snapshot document; persisting it is left to the caller.
//!
//! - [`mine_issues`] — closed issues with a PR merged to the default branch
//! - [`mine_archive`] — agent repositories among GitHub-archive events
//! - [`mine_awesome`] — agent repositories listed by awesome lists

mod archive;
mod awesome;
mod issues;

use std::path::PathBuf;

use chrono::{DateTime, Utc};

pub use archive::{mine_archive, ArchiveRun};
pub use awesome::{mine_awesome, AwesomeRun};
pub use issues::{issue_snapshot_path, mine_issues, IssueRun};

/// `~` and `$VAR` expansion for configured directories. Unexpandable paths
/// are used as written.
pub fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(e) => {
            tracing::warn!(path, error = %e, "Path expansion failed; using it verbatim");
            PathBuf::from(path)
        }
    }
}

/// `YYYY-MM-DD`, the date stamp in snapshot file names.
pub fn snapshot_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}
