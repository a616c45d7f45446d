use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::keywords::{AGENT_ISSUE_DEFINITION, AGENT_KEYWORDS, AGENT_REPO_DEFINITION};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RepohookConfig {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub repository_filter: RepositoryFilterConfig,
    #[serde(default)]
    pub classifier: ClassifierSettings,
    #[serde(default)]
    pub awesome: AwesomeConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: String,
    pub graphql_url: String,
    pub token: Option<String>,
    pub timeout_seconds: u64,
    /// First cooldown after an HTTP 403; later retries double it.
    pub rate_limit_cooldown_seconds: u64,
    pub max_rate_limit_cooldown_seconds: u64,
    pub max_rate_limit_retries: usize,
    /// Fixed delay before every search API call (stricter quota).
    pub search_delay_ms: u64,
    pub graphql_batch_size: usize,
    pub fallback_workers: usize,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            graphql_url: "https://api.github.com/graphql".to_string(),
            token: None,
            timeout_seconds: 10,
            rate_limit_cooldown_seconds: 60,
            max_rate_limit_cooldown_seconds: 300,
            max_rate_limit_retries: 3,
            search_delay_ms: 2000,
            graphql_batch_size: 50,
            fallback_workers: 10,
        }
    }
}

impl GitHubConfig {
    /// Token from config, else `GITHUB_TOKEN`. Empty strings count as absent.
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|t| !t.trim().is_empty())
    }
}

/// Issue evidence adapters, listed cheapest first.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum IssueAdapterKind {
    GitLog,
    Timeline,
    ClosingCommit,
    Search,
}

impl IssueAdapterKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "git-log" => Some(Self::GitLog),
            "timeline" => Some(Self::Timeline),
            "closing-commit" => Some(Self::ClosingCommit),
            "search" => Some(Self::Search),
            _ => None,
        }
    }
}

/// API-only runs share one rate-limit quota and stay sequential; `concurrent`
/// is meant for runs backed by a local clone (`pipeline.clone_dir`).
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Concurrent,
    #[default]
    Sequential,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    pub workers: usize,
    pub mode: ExecutionMode,
    pub adapters: Vec<IssueAdapterKind>,
    pub clone_dir: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            mode: ExecutionMode::Sequential,
            adapters: vec![
                IssueAdapterKind::GitLog,
                IssueAdapterKind::Timeline,
                IssueAdapterKind::ClosingCommit,
                IssueAdapterKind::Search,
            ],
            clone_dir: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RepositoryFilterConfig {
    pub keywords: Vec<String>,
    pub min_stars: u64,
    pub readme_char_budget: usize,
    /// Candidates whose name or description contains one of these are dropped.
    pub excluded_terms: Vec<String>,
}

impl Default for RepositoryFilterConfig {
    fn default() -> Self {
        Self {
            keywords: AGENT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            min_stars: 10,
            readme_char_budget: 3000,
            excluded_terms: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClassifierSettings {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub batch_size: usize,
    pub pause_ms: u64,
    pub context_char_budget: usize,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    /// Inserted into repository prompts.
    pub definition: String,
    /// Inserted into issue prompts.
    pub issue_definition: String,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            temperature: 0.1,
            batch_size: 10,
            pause_ms: 1000,
            context_char_budget: 3000,
            max_retries: 3,
            retry_delay_ms: 1000,
            definition: AGENT_REPO_DEFINITION.to_string(),
            issue_definition: AGENT_ISSUE_DEFINITION.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AwesomeConfig {
    pub search_keywords: Vec<String>,
    pub min_stars: u64,
    pub max_repos_per_keyword: usize,
    /// README prefix handed to the extraction prompt.
    pub readme_char_budget: usize,
}

impl Default for AwesomeConfig {
    fn default() -> Self {
        Self {
            search_keywords: vec![
                "awesome-agent".to_string(),
                "awesome-llm".to_string(),
                "awesome-ai-agents".to_string(),
            ],
            min_stars: 50,
            max_repos_per_keyword: 10,
            readme_char_budget: 15_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    /// Repository snapshots and the merged artifact.
    pub data_dir: String,
    pub merged_file_name: String,
    /// Issue snapshots, one `<owner>-<repo>-<YYYYMMDD>/issue.json` per crawl.
    pub issue_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: "data/hooked_repo".to_string(),
            merged_file_name: "agent_repo.json".to_string(),
            issue_dir: "data/hooked_issue".to_string(),
        }
    }
}

impl RepohookConfig {
    /// Load `path` (optional, TOML) overlaid by `REPOHOOK_*` environment variables.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("REPOHOOK")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("pipeline.adapters")
                    .with_list_parse_key("repository_filter.keywords")
                    .with_list_parse_key("repository_filter.excluded_terms")
                    .with_list_parse_key("awesome.search_keywords"),
            )
            .build()?;
        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_run_without_a_file() {
        let cfg = RepohookConfig::load("does-not-exist-repohook.toml").unwrap();
        assert_eq!(cfg.github.api_url, "https://api.github.com");
        assert_eq!(cfg.github.graphql_batch_size, 50);
        assert_eq!(cfg.pipeline.adapters.first(), Some(&IssueAdapterKind::GitLog));
        assert!(cfg.pipeline.workers >= 1);
        assert_eq!(cfg.pipeline.mode, ExecutionMode::Sequential);
        assert_eq!(RepohookConfig::default().pipeline.mode, ExecutionMode::Sequential);
        assert_eq!(cfg.repository_filter.min_stars, 10);
        assert!(cfg.repository_filter.keywords.iter().any(|k| k == "agent"));
        assert_eq!(cfg.awesome.readme_char_budget, 15_000);
        assert_eq!(cfg.awesome.search_keywords.len(), 3);
    }

    #[test]
    fn test_adapter_kind_parse() {
        assert_eq!(IssueAdapterKind::parse("git-log"), Some(IssueAdapterKind::GitLog));
        assert_eq!(
            IssueAdapterKind::parse(" closing-commit "),
            Some(IssueAdapterKind::ClosingCommit)
        );
        assert_eq!(IssueAdapterKind::parse("carrier-pigeon"), None);
    }

    #[test]
    fn test_adapter_kinds_order_by_cost() {
        let mut kinds = vec![
            IssueAdapterKind::Search,
            IssueAdapterKind::GitLog,
            IssueAdapterKind::ClosingCommit,
            IssueAdapterKind::Timeline,
        ];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                IssueAdapterKind::GitLog,
                IssueAdapterKind::Timeline,
                IssueAdapterKind::ClosingCommit,
                IssueAdapterKind::Search,
            ]
        );
    }
}
