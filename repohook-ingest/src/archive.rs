//! GitHub-archive hourly event files (JSON lines) → repository candidates.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, Duration, DurationRound, NaiveDate, Timelike, Utc};
use repohook_core::RepositoryCandidate;
use serde::Deserialize;
use serde_json::Value;

use crate::snapshot::SnapshotError;

#[derive(Debug, Clone, Deserialize)]
pub struct EventRepo {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    pub repo: EventRepo,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payload: Value,
}

impl ArchiveEvent {
    fn repository_description(&self) -> Option<&str> {
        self.payload
            .get("repository")
            .and_then(|r| r.get("description"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}

/// Parse one event per line. Returns the events and the count of skipped lines.
pub fn read_events<R: BufRead>(reader: R) -> (Vec<ArchiveEvent>, usize) {
    let mut events = Vec::new();
    let mut skipped = 0;

    for line in reader.lines() {
        let Ok(line) = line else {
            skipped += 1;
            continue;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<ArchiveEvent>(line) {
            Ok(event) => events.push(event),
            Err(_) => skipped += 1,
        }
    }

    (events, skipped)
}

pub fn read_event_file(path: &Path) -> Result<Vec<ArchiveEvent>, SnapshotError> {
    let file = File::open(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let (events, skipped) = read_events(BufReader::new(file));
    if skipped > 0 {
        tracing::debug!(file = %path.display(), skipped, "Skipped malformed event lines");
    }
    Ok(events)
}

/// Inclusive `[start, end]` window over event `created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl EventWindow {
    pub fn hours_before(reference: DateTime<Utc>, hours: u32) -> Self {
        Self {
            start: reference - Duration::hours(i64::from(hours)),
            end: reference,
        }
    }

    /// Events without a timestamp are outside every window.
    pub fn contains(&self, event: &ArchiveEvent) -> bool {
        event
            .created_at
            .is_some_and(|t| t >= self.start && t <= self.end)
    }

    /// `(date, hour)` pairs of the hourly archive files covering the window.
    pub fn archive_hours(&self) -> Vec<(NaiveDate, u32)> {
        let Ok(mut cursor) = self.start.duration_trunc(Duration::hours(1)) else {
            return Vec::new();
        };
        let mut hours = Vec::new();
        while cursor <= self.end {
            hours.push((cursor.date_naive(), cursor.hour()));
            cursor += Duration::hours(1);
        }
        hours
    }

    pub fn filter(&self, events: Vec<ArchiveEvent>) -> Vec<ArchiveEvent> {
        events.into_iter().filter(|e| self.contains(e)).collect()
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveRepository {
    pub candidate: RepositoryCandidate,
    pub event_types: BTreeSet<String>,
}

/// One candidate per distinct `repo.name`, sorted by name.
pub fn extract_candidates(events: &[ArchiveEvent]) -> Vec<ArchiveRepository> {
    let mut repos: BTreeMap<&str, ArchiveRepository> = BTreeMap::new();

    for event in events {
        let name = event.repo.name.trim();
        if name.is_empty() {
            continue;
        }
        let entry = repos.entry(name).or_insert_with(|| ArchiveRepository {
            candidate: RepositoryCandidate::named(name),
            event_types: BTreeSet::new(),
        });
        if entry.candidate.description.is_none() {
            entry.candidate.description = event.repository_description().map(str::to_string);
        }
        if !event.event_type.is_empty() {
            entry.event_types.insert(event.event_type.clone());
        }
    }

    repos.into_values().collect()
}
