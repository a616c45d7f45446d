use serde::{Deserialize, Serialize};

/// Branches a merge must target to count.
pub const DEFAULT_BRANCHES: &[&str] = &["main", "master"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PullRequestRecord {
    pub number: u64,
    pub state: String,
    pub title: String,
    pub url: String,
    pub merged: bool,
    pub base_branch: String,
}

impl PullRequestRecord {
    pub fn targets_default_branch(&self) -> bool {
        DEFAULT_BRANCHES.contains(&self.base_branch.as_str())
    }

    /// Merged into `main` or `master`.
    pub fn is_merged_to_default(&self) -> bool {
        self.merged && self.targets_default_branch()
    }
}
