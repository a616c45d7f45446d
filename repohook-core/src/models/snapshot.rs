//! Output documents written once at the end of each mining run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::evidence::EvidenceSource;
use super::issue::Issue;
use super::pull_request::PullRequestRecord;
use super::verdict::EvidenceConfidence;

/// File-name prefix of archive-mining snapshots.
pub const ARCHIVE_SNAPSHOT_PREFIX: &str = "github_archive_repo_";
/// File-name prefix of awesome-list snapshots.
pub const AWESOME_SNAPSHOT_PREFIX: &str = "github_repo_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedIssue {
    #[serde(flatten)]
    pub issue: Issue,
    pub merged_prs: Vec<PullRequestRecord>,
    pub evidence_sources_used: Vec<EvidenceSource>,
    pub confidence: EvidenceConfidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueSnapshot {
    pub repo: String,
    pub crawl_time: DateTime<Utc>,
    pub total_count: usize,
    pub issues: Vec<AcceptedIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoStars {
    pub name: String,
    #[serde(default)]
    pub stars: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSnapshot {
    pub date: String,
    pub time_window_hours: Option<u32>,
    pub total_events: usize,
    pub total_repos: usize,
    pub agent_repos_count: usize,
    pub used_ai_filter: bool,
    pub min_stars: u64,
    pub agent_repos: Vec<RepoStars>,
}

impl ArchiveSnapshot {
    pub fn file_name(&self) -> String {
        format!("{}{}.json", ARCHIVE_SNAPSHOT_PREFIX, self.date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AwesomeRepo {
    pub name: String,
    #[serde(default)]
    pub stars: u64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwesomeSnapshot {
    pub date: String,
    pub search_keywords: Vec<String>,
    pub min_stars: u64,
    pub awesome_repos_count: usize,
    pub agent_repos_count: usize,
    pub awesome_repos: Vec<AwesomeRepo>,
    pub agent_repos: Vec<String>,
    /// Agent repository -> awesome lists that mention it.
    pub repo_sources: BTreeMap<String, Vec<String>>,
}

impl AwesomeSnapshot {
    pub fn file_name(&self) -> String {
        format!("{}{}.json", AWESOME_SNAPSHOT_PREFIX, self.date)
    }
}
