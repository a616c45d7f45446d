//! Result merger — fold snapshot files into one deduplicated record set.
//!
//! - Records are keyed by full name; stars take the maximum seen
//! - Sources, source types and original sources are unioned
//! - A merged artifact re-enters through its recorded provenance, so
//!   re-merging an output with its inputs changes nothing
//! - Files that fail to parse are logged and skipped

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::snapshot::{load_snapshot, SnapshotEntry, SnapshotKind, SourceType};

// ============================================================================
// Record set
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordProvenance {
    pub stars: u64,
    pub sources: BTreeSet<String>,
    pub source_types: BTreeSet<SourceType>,
    pub original_sources: BTreeSet<String>,
}

impl RecordProvenance {
    fn absorb(&mut self, entry: SnapshotEntry) {
        self.stars = self.stars.max(entry.stars);
        self.sources.extend(entry.sources);
        self.source_types.extend(entry.source_types);
        self.original_sources.extend(entry.original_sources);
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: BTreeMap<String, RecordProvenance>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fold(&mut self, entry: SnapshotEntry) {
        if entry.name.trim().is_empty() {
            return;
        }
        self.records
            .entry(entry.name.clone())
            .or_default()
            .absorb(entry);
    }

    pub fn get(&self, name: &str) -> Option<&RecordProvenance> {
        self.records.get(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Stars descending, name ascending on ties.
    pub fn sorted(&self) -> Vec<MergedRecord> {
        let mut out: Vec<MergedRecord> = self
            .records
            .iter()
            .map(|(name, p)| MergedRecord {
                name: name.clone(),
                stars: p.stars,
                sources: p.sources.iter().cloned().collect(),
                source_types: p.source_types.iter().copied().collect(),
                original_sources: (!p.original_sources.is_empty())
                    .then(|| p.original_sources.iter().cloned().collect()),
                source_count: p.sources.len(),
            })
            .collect();
        out.sort_by(|a, b| b.stars.cmp(&a.stars).then_with(|| a.name.cmp(&b.name)));
        out
    }

    /// The bare name list, in artifact order.
    pub fn names(&self) -> Vec<String> {
        self.sorted().into_iter().map(|r| r.name).collect()
    }

    pub fn statistics(&self) -> MergeStatistics {
        let mut stats = MergeStatistics {
            total_repos: self.records.len(),
            ..MergeStatistics::default()
        };
        for p in self.records.values() {
            for ty in &p.source_types {
                *stats.by_source_type.entry(*ty).or_insert(0) += 1;
            }
            let archive = p.source_types.contains(&SourceType::GithubArchive);
            let repo = p.source_types.contains(&SourceType::GithubRepo);
            match (archive, repo) {
                (true, true) => stats.from_both += 1,
                (true, false) => stats.from_github_archive += 1,
                (false, true) => stats.from_github_repo += 1,
                (false, false) => {}
            }
            if p.sources.len() > 1 {
                stats.multi_source += 1;
            }
        }
        stats
    }

    pub fn to_artifact(&self, generated_at: DateTime<Utc>) -> MergedArtifact {
        MergedArtifact {
            generated_at: generated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            statistics: self.statistics(),
            repositories: self.sorted(),
        }
    }
}

// ============================================================================
// Artifact shapes
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergedRecord {
    pub name: String,
    #[serde(default)]
    pub stars: u64,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub source_types: Vec<SourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_sources: Option<Vec<String>>,
    #[serde(default)]
    pub source_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeStatistics {
    pub total_repos: usize,
    pub by_source_type: BTreeMap<SourceType, usize>,
    /// Only in archive snapshots.
    pub from_github_archive: usize,
    /// Only in awesome-list snapshots.
    pub from_github_repo: usize,
    pub from_both: usize,
    /// Seen in more than one file.
    pub multi_source: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedArtifact {
    pub generated_at: String,
    pub statistics: MergeStatistics,
    pub repositories: Vec<MergedRecord>,
}

// ============================================================================
// Merge over files
// ============================================================================

#[derive(Debug, Clone)]
pub struct ProcessedFile {
    pub path: PathBuf,
    pub kind: SnapshotKind,
    pub extracted: usize,
}

#[derive(Debug, Default)]
pub struct MergeReport {
    pub records: RecordSet,
    pub processed: Vec<ProcessedFile>,
    /// (path, reason) for every file that was not merged.
    pub skipped: Vec<(PathBuf, String)>,
    pub total_extracted: usize,
}

impl MergeReport {
    pub fn deduplicated(&self) -> usize {
        self.total_extracted.saturating_sub(self.records.len())
    }
}

/// Merge every file in order. A bad file never aborts the merge.
pub fn merge_files<P: AsRef<Path>>(paths: &[P]) -> MergeReport {
    let mut report = MergeReport::default();

    for path in paths {
        let path = path.as_ref();
        match load_snapshot(path) {
            Ok(snapshot) => {
                let extracted = snapshot.entries.len();
                tracing::info!(
                    file = %snapshot.file_name,
                    kind = ?snapshot.kind,
                    extracted,
                    "Merged snapshot"
                );
                for entry in snapshot.entries {
                    report.records.fold(entry);
                }
                report.total_extracted += extracted;
                report.processed.push(ProcessedFile {
                    path: path.to_path_buf(),
                    kind: snapshot.kind,
                    extracted,
                });
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Skipping snapshot");
                report.skipped.push((path.to_path_buf(), e.to_string()));
            }
        }
    }

    tracing::info!(
        files = report.processed.len(),
        skipped = report.skipped.len(),
        extracted = report.total_extracted,
        unique = report.records.len(),
        "Merge complete"
    );
    report
}
