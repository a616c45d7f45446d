//! repohook — mine agent issues and repositories from GitHub
//!
//! # Subcommands
//! - `issues --repo <owner/name>`  — closed issues fixed by a PR merged to the default branch
//! - `archive <event files...>`    — agent repositories among GitHub-archive events
//! - `awesome`                     — agent repositories listed by awesome lists
//! - `merge [files...]`            — fold repository snapshots into one provenance-tracked list

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use repohook_core::config::{ExecutionMode, IssueAdapterKind};
use repohook_core::keywords::KeywordMatcher;
use repohook_core::{create_classifier, ClassifierBackend, RepohookConfig};
use repohook_ingest::{merge_files, snapshot_files_in, write_json_atomic, EventWindow};
use repohook_pipeline::runs::{expand_path, issue_snapshot_path, snapshot_date};
use repohook_pipeline::{
    mine_archive, mine_awesome, mine_issues, ArchiveRun, AwesomeExtractor, AwesomeRun,
    ClassificationGate, GitHubClient, IssueRun, ProgressReporter, RunContext,
};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "repohook", version, about = "Mine agent issues and repositories from GitHub")]
struct Cli {
    /// TOML config file (optional; REPOHOOK_* env vars override it)
    #[arg(short, long, global = true, default_value = "repohook.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Closed issues linked to a PR merged into main/master
    Issues {
        /// Repository as owner/name
        #[arg(long)]
        repo: String,

        /// Stop listing after this many closed issues
        #[arg(long)]
        limit: Option<usize>,

        /// Local clone for the git-log adapter
        #[arg(long)]
        clone_dir: Option<String>,

        /// Evidence adapters, e.g. `git-log,timeline`
        #[arg(long, value_delimiter = ',', value_parser = parse_adapter)]
        adapters: Vec<IssueAdapterKind>,

        /// Resolve issues in parallel (meant for --clone-dir runs; API-only
        /// runs share one rate-limit quota)
        #[arg(long)]
        concurrent: bool,

        /// Also require a positive agent-issue classification
        #[arg(long)]
        classify: bool,

        /// Output file (default: <issue_dir>/<owner>-<name>-<YYYYMMDD>/issue.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Agent repositories among GitHub-archive hourly event files
    Archive {
        /// Event files, one JSON event per line
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Keep only events from the last N hours before --reference
        #[arg(long)]
        hours: Option<u32>,

        /// Window end (RFC 3339); defaults to now
        #[arg(long)]
        reference: Option<DateTime<Utc>>,

        /// Skip the classification stage
        #[arg(long)]
        no_ai: bool,

        #[arg(long)]
        min_stars: Option<u64>,

        /// Keep only the N most-starred results
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Agent repositories extracted from popular awesome lists
    Awesome {
        /// Search keywords (replaces the configured list)
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,

        #[arg(long)]
        min_stars: Option<u64>,

        /// Awesome lists taken per keyword
        #[arg(long)]
        max_per_keyword: Option<usize>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Merge repository snapshots into one deduplicated list
    Merge {
        /// Snapshot files (default: every *.json in the data directory)
        files: Vec<PathBuf>,

        /// Output file (default: <data_dir>/<merged_file_name>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write records with provenance and statistics instead of bare names
        #[arg(long)]
        detailed: bool,
    },
}

fn parse_adapter(s: &str) -> Result<IssueAdapterKind, String> {
    IssueAdapterKind::parse(s).ok_or_else(|| {
        format!("unknown adapter '{}' (expected git-log, timeline, closing-commit or search)", s)
    })
}

// ============================================================================
// Commands
// ============================================================================

fn github_client(config: &RepohookConfig) -> anyhow::Result<Arc<GitHubClient>> {
    Ok(Arc::new(GitHubClient::new(&config.github).context("Failed to build GitHub client")?))
}

fn classifier(config: &RepohookConfig) -> anyhow::Result<Arc<dyn ClassifierBackend>> {
    let backend = create_classifier(&config.classifier)
        .context("Classifier unavailable (set classifier.api_key or OPENAI_API_KEY)")?;
    Ok(Arc::from(backend))
}

fn run_context() -> Arc<RunContext> {
    Arc::new(RunContext::new(ProgressReporter::stderr()))
}

fn write_output<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    write_json_atomic(path, value)?;
    println!("Saved {}", path.display());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_issues(
    mut config: RepohookConfig,
    repo: String,
    limit: Option<usize>,
    clone_dir: Option<String>,
    adapters: Vec<IssueAdapterKind>,
    concurrent: bool,
    classify: bool,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    if !adapters.is_empty() {
        config.pipeline.adapters = adapters;
    }
    if concurrent {
        config.pipeline.mode = ExecutionMode::Concurrent;
    }
    let clone_dir = clone_dir
        .or_else(|| config.pipeline.clone_dir.clone())
        .map(|dir| expand_path(&dir));
    if config.pipeline.mode == ExecutionMode::Concurrent && clone_dir.is_none() {
        tracing::warn!("Concurrent mode without a local clone; API adapters will contend for one quota");
    }

    let client = github_client(&config)?;
    let gate = if classify {
        Some(ClassificationGate::from_settings(classifier(&config)?, &config.classifier))
    } else {
        None
    };

    let run = IssueRun { repo, limit, clone_dir };
    let snapshot = mine_issues(&config, client, gate.as_ref(), &run, run_context()).await?;

    let path = output.unwrap_or_else(|| {
        issue_snapshot_path(&expand_path(&config.output.issue_dir), &run.repo, snapshot.crawl_time)
    });
    write_output(&path, &snapshot)?;
    println!("{} linked issues", snapshot.total_count);
    Ok(())
}

async fn cmd_archive(
    mut config: RepohookConfig,
    files: Vec<PathBuf>,
    hours: Option<u32>,
    reference: Option<DateTime<Utc>>,
    no_ai: bool,
    min_stars: Option<u64>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    if let Some(min_stars) = min_stars {
        config.repository_filter.min_stars = min_stars;
    }
    let now = Utc::now();
    let window = hours.map(|h| EventWindow::hours_before(reference.unwrap_or(now), h));
    if let Some(window) = &window {
        let expected: Vec<String> = window
            .archive_hours()
            .into_iter()
            .map(|(date, hour)| format!("{}-{}", date.format("%Y-%m-%d"), hour))
            .collect();
        tracing::info!(hours = ?expected, "Archive hours covered by the window");
    }

    let client = github_client(&config)?;
    let gate = if no_ai || !config.classifier.enabled {
        None
    } else {
        Some(ClassificationGate::from_settings(classifier(&config)?, &config.classifier))
    };

    let run = ArchiveRun {
        event_files: files,
        window,
        window_hours: hours,
        limit,
        date: snapshot_date(reference.unwrap_or(now)),
    };
    let snapshot = mine_archive(&config, client, gate.as_ref(), &run, run_context()).await?;

    let path = expand_path(&config.output.data_dir).join(snapshot.file_name());
    write_output(&path, &snapshot)?;
    println!(
        "{} of {} repositories are agent repositories",
        snapshot.agent_repos_count, snapshot.total_repos
    );
    Ok(())
}

async fn cmd_awesome(
    mut config: RepohookConfig,
    keywords: Vec<String>,
    min_stars: Option<u64>,
    max_per_keyword: Option<usize>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    if !keywords.is_empty() {
        config.awesome.search_keywords = keywords;
    }
    if let Some(min_stars) = min_stars {
        config.awesome.min_stars = min_stars;
    }
    if let Some(max) = max_per_keyword {
        config.awesome.max_repos_per_keyword = max;
    }

    let client = github_client(&config)?;
    let extractor = AwesomeExtractor::new(
        classifier(&config)?,
        config.classifier.definition.clone(),
        config.awesome.readme_char_budget,
        KeywordMatcher::new(&config.repository_filter.excluded_terms),
    );

    let run = AwesomeRun {
        limit,
        date: snapshot_date(Utc::now()),
    };
    let snapshot = mine_awesome(&config, client, &extractor, &run, run_context()).await?;

    let path = expand_path(&config.output.data_dir).join(snapshot.file_name());
    write_output(&path, &snapshot)?;
    println!(
        "{} agent repositories from {} awesome lists",
        snapshot.agent_repos_count, snapshot.awesome_repos_count
    );
    Ok(())
}

fn cmd_merge(
    config: RepohookConfig,
    files: Vec<PathBuf>,
    output: Option<PathBuf>,
    detailed: bool,
) -> anyhow::Result<()> {
    let data_dir = expand_path(&config.output.data_dir);
    let output = output.unwrap_or_else(|| data_dir.join(&config.output.merged_file_name));

    let files = if files.is_empty() {
        let exclude = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        snapshot_files_in(&data_dir, &exclude)?
    } else {
        files
    };
    if files.is_empty() {
        anyhow::bail!("No snapshot files found in {}", data_dir.display());
    }

    let report = merge_files(&files);
    for (path, reason) in &report.skipped {
        eprintln!("Skipped {}: {}", path.display(), reason);
    }

    if detailed {
        write_output(&output, &report.records.to_artifact(Utc::now()))?;
    } else {
        write_output(&output, &report.records.names())?;
    }

    let stats = report.records.statistics();
    println!(
        "{} repositories from {} files ({} duplicates folded, {} in both sources)",
        stats.total_repos,
        report.processed.len(),
        report.deduplicated(),
        stats.from_both
    );
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        fmt().json().with_env_filter(filter).with_writer(std::io::stderr).init();
    } else {
        fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = RepohookConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config))?;

    match cli.command {
        Commands::Issues {
            repo,
            limit,
            clone_dir,
            adapters,
            concurrent,
            classify,
            output,
        } => cmd_issues(config, repo, limit, clone_dir, adapters, concurrent, classify, output).await,
        Commands::Archive {
            files,
            hours,
            reference,
            no_ai,
            min_stars,
            limit,
        } => cmd_archive(config, files, hours, reference, no_ai, min_stars, limit).await,
        Commands::Awesome {
            keywords,
            min_stars,
            max_per_keyword,
            limit,
        } => cmd_awesome(config, keywords, min_stars, max_per_keyword, limit).await,
        Commands::Merge {
            files,
            output,
            detailed,
        } => cmd_merge(config, files, output, detailed),
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.json);

    if let Err(e) = run(cli).await {
        eprintln!("repohook: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issues_adapter_list_parses() {
        let cli = Cli::try_parse_from([
            "repohook",
            "issues",
            "--repo",
            "o/r",
            "--adapters",
            "timeline,search",
        ])
        .unwrap();

        match cli.command {
            Commands::Issues { repo, adapters, concurrent, .. } => {
                assert_eq!(repo, "o/r");
                assert_eq!(adapters, vec![IssueAdapterKind::Timeline, IssueAdapterKind::Search]);
                assert!(!concurrent);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_concurrency_is_opt_in() {
        let cli = Cli::try_parse_from([
            "repohook",
            "issues",
            "--repo",
            "o/r",
            "--clone-dir",
            "~/src/r",
            "--concurrent",
        ])
        .unwrap();

        match cli.command {
            Commands::Issues { clone_dir, concurrent, .. } => {
                assert_eq!(clone_dir.as_deref(), Some("~/src/r"));
                assert!(concurrent);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(RepohookConfig::default().pipeline.mode, ExecutionMode::Sequential);
    }

    #[test]
    fn test_unknown_adapter_is_rejected() {
        let err = Cli::try_parse_from(["repohook", "issues", "--repo", "o/r", "--adapters", "carrier-pigeon"]);
        assert!(err.is_err());
    }

    #[test]
    fn test_archive_requires_files_and_parses_reference() {
        assert!(Cli::try_parse_from(["repohook", "archive"]).is_err());

        let cli = Cli::try_parse_from([
            "repohook",
            "--config",
            "custom.toml",
            "archive",
            "2024-01-01-10.json",
            "--hours",
            "3",
            "--reference",
            "2024-01-01T12:00:00Z",
            "--no-ai",
        ])
        .unwrap();
        assert_eq!(cli.config, "custom.toml");
        match cli.command {
            Commands::Archive { files, hours, reference, no_ai, .. } => {
                assert_eq!(files, vec![PathBuf::from("2024-01-01-10.json")]);
                assert_eq!(hours, Some(3));
                assert_eq!(reference.map(|r| r.to_rfc3339()), Some("2024-01-01T12:00:00+00:00".to_string()));
                assert!(no_ai);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_merge_writes_bare_list_by_default() {
        let dir = tempfile::tempdir().unwrap();
        write_json_atomic(
            &dir.path().join("github_repo_2024-01-02.json"),
            &serde_json::json!({
                "agent_repos": ["b/two", "a/one"],
                "awesome_repos": [{ "name": "a/one", "stars": 7 }],
                "repo_sources": {}
            }),
        )
        .unwrap();

        let mut config = RepohookConfig::default();
        config.output.data_dir = dir.path().to_string_lossy().into_owned();
        cmd_merge(config, Vec::new(), None, false).unwrap();

        let written: Vec<String> = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("agent_repo.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(written, vec!["a/one", "b/two"]);
    }
}
