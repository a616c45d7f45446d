//! Snapshot shape classification, loading and atomic writing.
//!
//! Snapshots produced by different runs have different shapes. The shape is
//! decided once per file by [`SnapshotKind::classify`] and every later step
//! matches on the kind instead of probing fields again.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use repohook_core::models::snapshot::{ARCHIVE_SNAPSHOT_PREFIX, AWESOME_SNAPSHOT_PREFIX};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::merger::MergedRecord;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unrecognised snapshot shape: {file} ({reason})")]
    UnknownShape { file: String, reason: String },
}

/// Which mining run produced a record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    GithubArchive,
    GithubRepo,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GithubArchive => "github_archive",
            Self::GithubRepo => "github_repo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// `agent_repos` is a list of `{name, stars}` objects.
    Archive,
    /// `agent_repos` is a list of bare names, stars in `awesome_repos`.
    Awesome,
    /// A detailed merge artifact carrying its own provenance.
    Merged,
}

impl SnapshotKind {
    /// File-name prefix first; structure decides when there is no prefix or
    /// when the prefix contradicts the contents.
    pub fn classify(file_name: &str, data: &Value) -> Option<Self> {
        let by_name = if file_name.starts_with(ARCHIVE_SNAPSHOT_PREFIX) {
            Some(Self::Archive)
        } else if file_name.starts_with(AWESOME_SNAPSHOT_PREFIX) {
            Some(Self::Awesome)
        } else {
            None
        };
        let by_shape = Self::from_structure(data);

        match (by_name, by_shape) {
            (Some(named), Some(shaped)) if named != shaped => {
                tracing::warn!(
                    file = file_name,
                    ?named,
                    ?shaped,
                    "Snapshot prefix contradicts its contents; using contents"
                );
                Some(shaped)
            }
            (Some(named), _) => Some(named),
            (None, shaped) => shaped,
        }
    }

    fn from_structure(data: &Value) -> Option<Self> {
        if data.get("repositories").is_some_and(Value::is_array) && data.get("statistics").is_some()
        {
            return Some(Self::Merged);
        }
        match data
            .get("agent_repos")
            .and_then(Value::as_array)
            .and_then(|repos| repos.first())
        {
            Some(Value::Object(first)) if first.contains_key("name") => Some(Self::Archive),
            Some(Value::String(_)) => Some(Self::Awesome),
            _ => None,
        }
    }
}

/// One record extracted from a snapshot, already in merge form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub name: String,
    pub stars: u64,
    pub sources: BTreeSet<String>,
    pub source_types: BTreeSet<SourceType>,
    pub original_sources: BTreeSet<String>,
}

impl SnapshotEntry {
    fn single(name: String, stars: u64, file_name: &str, source_type: SourceType) -> Self {
        Self {
            name,
            stars,
            sources: BTreeSet::from([file_name.to_string()]),
            source_types: BTreeSet::from([source_type]),
            original_sources: BTreeSet::new(),
        }
    }
}

// Lenient load shapes: older snapshots omit most header fields.

#[derive(Deserialize)]
#[serde(untagged)]
enum ArchiveRepoEntry {
    Named {
        name: String,
        #[serde(default)]
        stars: u64,
    },
    Bare(String),
}

#[derive(Deserialize)]
struct ArchiveShape {
    #[serde(default)]
    agent_repos: Vec<ArchiveRepoEntry>,
}

#[derive(Deserialize)]
struct AwesomeStars {
    name: String,
    #[serde(default)]
    stars: u64,
}

#[derive(Deserialize)]
struct AwesomeShape {
    #[serde(default)]
    agent_repos: Vec<String>,
    #[serde(default)]
    awesome_repos: Vec<AwesomeStars>,
    #[serde(default)]
    repo_sources: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct MergedShape {
    repositories: Vec<MergedRecord>,
}

#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    pub file_name: String,
    pub kind: SnapshotKind,
    pub entries: Vec<SnapshotEntry>,
}

/// Turn a classified document into merge entries.
pub fn extract_entries(
    kind: SnapshotKind,
    file_name: &str,
    data: Value,
) -> Result<Vec<SnapshotEntry>, serde_json::Error> {
    let entries = match kind {
        SnapshotKind::Archive => {
            let shape: ArchiveShape = serde_json::from_value(data)?;
            shape
                .agent_repos
                .into_iter()
                .map(|entry| match entry {
                    ArchiveRepoEntry::Named { name, stars } => (name, stars),
                    ArchiveRepoEntry::Bare(name) => (name, 0),
                })
                .map(|(name, stars)| {
                    SnapshotEntry::single(name, stars, file_name, SourceType::GithubArchive)
                })
                .collect()
        }
        SnapshotKind::Awesome => {
            let shape: AwesomeShape = serde_json::from_value(data)?;
            let stars: BTreeMap<&str, u64> = shape
                .awesome_repos
                .iter()
                .map(|r| (r.name.as_str(), r.stars))
                .collect();
            shape
                .agent_repos
                .iter()
                .map(|name| {
                    let mut entry = SnapshotEntry::single(
                        name.clone(),
                        stars.get(name.as_str()).copied().unwrap_or(0),
                        file_name,
                        SourceType::GithubRepo,
                    );
                    if let Some(origins) = shape.repo_sources.get(name) {
                        entry.original_sources.extend(origins.iter().cloned());
                    }
                    entry
                })
                .collect()
        }
        SnapshotKind::Merged => {
            let shape: MergedShape = serde_json::from_value(data)?;
            shape
                .repositories
                .into_iter()
                .map(|record| SnapshotEntry {
                    name: record.name,
                    stars: record.stars,
                    sources: record.sources.into_iter().collect(),
                    source_types: record.source_types.into_iter().collect(),
                    original_sources: record.original_sources.unwrap_or_default().into_iter().collect(),
                })
                .collect()
        }
    };
    Ok(entries)
}

pub fn load_snapshot(path: &Path) -> Result<LoadedSnapshot, SnapshotError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let raw = fs::read_to_string(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let data: Value = serde_json::from_str(&raw).map_err(|source| SnapshotError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    if data.is_array() {
        return Err(SnapshotError::UnknownShape {
            file: file_name,
            reason: "bare name list carries no provenance".to_string(),
        });
    }

    let kind = SnapshotKind::classify(&file_name, &data).ok_or_else(|| {
        SnapshotError::UnknownShape {
            file: file_name.clone(),
            reason: "no recognisable agent_repos or repositories field".to_string(),
        }
    })?;

    let entries = extract_entries(kind, &file_name, data).map_err(|source| SnapshotError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(LoadedSnapshot {
        file_name,
        kind,
        entries,
    })
}

/// `*.json` files directly under `dir`, sorted, excluding `exclude_name`.
pub fn snapshot_files_in(dir: &Path, exclude_name: &str) -> Result<Vec<PathBuf>, SnapshotError> {
    let read_dir = fs::read_dir(dir).map_err(|source| SnapshotError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = read_dir
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .filter(|p| p.file_name().is_some_and(|n| n != exclude_name))
        .collect();
    files.sort();
    Ok(files)
}

/// Serialize fully, write to a temp file beside `path`, then rename into place.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), SnapshotError> {
    let io_err = |source: std::io::Error| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    };

    let bytes = serde_json::to_vec_pretty(value).map_err(|source| SnapshotError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
    tmp.write_all(&bytes).map_err(io_err)?;
    tmp.write_all(b"\n").map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "Wrote JSON artifact");
    Ok(())
}
