//! Snapshot files: shape classification, loading, atomic writes, merging of
//! independent runs, and GitHub-archive event parsing.

pub mod archive;
pub mod merger;
pub mod snapshot;

pub use archive::{extract_candidates, read_event_file, read_events, ArchiveEvent, ArchiveRepository, EventWindow};
pub use merger::{
    merge_files, MergeReport, MergeStatistics, MergedArtifact, MergedRecord, RecordProvenance,
    RecordSet,
};
pub use snapshot::{
    load_snapshot, snapshot_files_in, write_json_atomic, LoadedSnapshot, SnapshotEntry,
    SnapshotError, SnapshotKind, SourceType,
};
