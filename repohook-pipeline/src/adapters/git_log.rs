use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use regex::Regex;
use repohook_core::{Evidence, EvidenceSource, Issue};
use tokio::process::Command;

use super::IssueEvidenceAdapter;

const GIT_TIMEOUT: Duration = Duration::from_secs(30);

const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';

/// `Merge pull request #N` (merge commits) and `(#N)` (squash merges).
const PR_PATTERNS: &[&str] = &[r"Merge pull request #(\d+)", r"\(#(\d+)\)"];

/// PR numbers referenced by a commit message that mentions `issue`. The
/// issue's own number is never a PR candidate.
pub(crate) fn pr_references(message: &str, issue: u64) -> BTreeSet<u64> {
    let mut found = BTreeSet::new();
    for pattern in PR_PATTERNS {
        if let Ok(re) = Regex::new(pattern) {
            found.extend(
                re.captures_iter(message)
                    .filter_map(|caps| caps.get(1)?.as_str().parse::<u64>().ok()),
            );
        }
    }
    found.remove(&issue);
    found
}

/// Linkage evidence from the commit history of a local clone.
pub struct GitLogAdapter {
    clone_dir: PathBuf,
}

impl GitLogAdapter {
    pub fn new(clone_dir: &Path) -> Self {
        Self {
            clone_dir: clone_dir.to_path_buf(),
        }
    }

    /// Full messages of every commit whose message mentions `#issue`.
    async fn messages_mentioning(&self, issue: u64) -> anyhow::Result<Vec<String>> {
        let grep = format!("--grep=#{}", issue);

        let output = tokio::time::timeout(
            GIT_TIMEOUT,
            Command::new("git")
                .args(["log", "--all", "--format=%H%x1f%B%x1e", &grep])
                .current_dir(&self.clone_dir)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .context("git log timed out")?
        .context("failed to run git")?;

        if !output.status.success() {
            bail!(
                "git log failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        // `--grep` also hits #420 when looking for #42
        let mention = Regex::new(&format!(r"#{}\b", issue))?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        Ok(stdout
            .split(RECORD_SEP)
            .filter_map(|record| record.trim().split_once(FIELD_SEP))
            .map(|(_sha, message)| message)
            .filter(|message| mention.is_match(message))
            .map(str::to_string)
            .collect())
    }
}

#[async_trait]
impl IssueEvidenceAdapter for GitLogAdapter {
    fn source(&self) -> EvidenceSource {
        EvidenceSource::GitLog
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn try_gather(&self, issue: &Issue) -> anyhow::Result<Vec<Evidence>> {
        if !self.clone_dir.is_dir() {
            tracing::debug!(dir = %self.clone_dir.display(), "No local clone; no git evidence");
            return Ok(Vec::new());
        }

        let numbers: BTreeSet<u64> = self
            .messages_mentioning(issue.number)
            .await?
            .iter()
            .flat_map(|message| pr_references(message, issue.number))
            .collect();

        Ok(numbers
            .into_iter()
            .map(|n| Evidence::linked_pr(n, EvidenceSource::GitLog))
            .collect())
    }
}
