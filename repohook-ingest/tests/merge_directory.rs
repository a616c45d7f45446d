use std::fs;

use repohook_ingest::{merge_files, snapshot_files_in, write_json_atomic, SnapshotKind, SourceType};
use serde_json::json;

const OUTPUT: &str = "agent_repo.json";

#[test]
fn merge_directory_then_remerge_with_previous_output() {
    let dir = tempfile::tempdir().unwrap();

    write_json_atomic(
        &dir.path().join("github_archive_repo_2024-01-01.json"),
        &json!({
            "date": "2024-01-01",
            "agent_repos": [{ "name": "foo/bar", "stars": 100 }]
        }),
    )
    .unwrap();
    write_json_atomic(
        &dir.path().join("github_repo_2024-01-02.json"),
        &json!({
            "date": "2024-01-02",
            "agent_repos": ["foo/bar", "solo/repo"],
            "awesome_repos": [
                { "name": "foo/bar", "stars": 150 },
                { "name": "solo/repo", "stars": 150 }
            ],
            "repo_sources": {}
        }),
    )
    .unwrap();

    let files = snapshot_files_in(dir.path(), OUTPUT).unwrap();
    assert_eq!(files.len(), 2);

    let report = merge_files(&files);
    let kinds: Vec<_> = report.processed.iter().map(|p| p.kind).collect();
    assert_eq!(kinds, vec![SnapshotKind::Archive, SnapshotKind::Awesome]);

    let records = report.records.sorted();
    // equal stars: name order
    assert_eq!(records[0].name, "foo/bar");
    assert_eq!(records[0].stars, 150);
    assert_eq!(
        records[0].sources,
        vec![
            "github_archive_repo_2024-01-01.json".to_string(),
            "github_repo_2024-01-02.json".to_string()
        ]
    );
    assert_eq!(
        records[0].source_types,
        vec![SourceType::GithubArchive, SourceType::GithubRepo]
    );
    assert_eq!(records[1].name, "solo/repo");

    // bare list output in the same directory is excluded from the next scan
    write_json_atomic(&dir.path().join(OUTPUT), &report.records.names()).unwrap();
    // detailed output is picked up and folds back without changes
    write_json_atomic(
        &dir.path().join("agent_repo_detailed.json"),
        &report.records.to_artifact(chrono::Utc::now()),
    )
    .unwrap();

    let files = snapshot_files_in(dir.path(), OUTPUT).unwrap();
    assert_eq!(files.len(), 3);
    let again = merge_files(&files);
    assert_eq!(again.records.sorted(), records);

    let names: Vec<String> =
        serde_json::from_str(&fs::read_to_string(dir.path().join(OUTPUT)).unwrap()).unwrap();
    assert_eq!(names, vec!["foo/bar", "solo/repo"]);
}
