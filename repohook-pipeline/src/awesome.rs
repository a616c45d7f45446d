//! Awesome-list extraction: README of a curated list → agent repositories it
//! mentions, chosen by the classifier backend.

use std::collections::BTreeSet;
use std::sync::Arc;

use regex::Regex;
use repohook_core::keywords::KeywordMatcher;
use repohook_core::ClassifierBackend;

use crate::classify_gate::{truncate_chars, ClassificationPrompt};

/// Listing needs a little more latitude than a yes/no judgment.
const EXTRACTION_TEMPERATURE: f32 = 0.3;

const EXTRACTION_SYSTEM_PROMPT: &str =
    "You extract GitHub repository names from README files. Output only repository names.";

/// `/search/repositories` query for awesome lists matching `keyword`.
pub fn search_query(keyword: &str, min_stars: u64) -> String {
    format!("{} in:name,description stars:>={}", keyword, min_stars)
}

/// `owner/name` of every `github.com/owner/name...` link, without `.git` or
/// deeper path segments.
pub fn github_links(readme: &str) -> BTreeSet<String> {
    let mut links = BTreeSet::new();
    if let Ok(re) = Regex::new(r"github\.com/([a-zA-Z0-9_-]+/[a-zA-Z0-9_.-]+)") {
        for caps in re.captures_iter(readme) {
            if let Some(m) = caps.get(1) {
                let name = m.as_str().trim_end_matches('.');
                links.insert(name.trim_end_matches(".git").to_string());
            }
        }
    }
    links
}

/// One `owner/name` per line. Blank lines, `#`/`//` comments and a bare
/// `NONE` yield nothing; list bullets and numbering are stripped.
pub fn parse_repo_list(response: &str) -> Vec<String> {
    let trimmed = response.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Vec::new();
    }

    let (Ok(bullet), Ok(numbered), Ok(name)) = (
        Regex::new(r"^[-*+]\s+"),
        Regex::new(r"^\d+\.\s+"),
        Regex::new(r"([a-zA-Z0-9_-]+/[a-zA-Z0-9_.-]+)"),
    ) else {
        return Vec::new();
    };

    let mut seen = BTreeSet::new();
    let mut repos = Vec::new();
    for line in trimmed.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        let line = bullet.replace(line, "");
        let line = numbered.replace(&line, "");
        // full URLs: the name follows the host
        let text = match line.split_once("github.com/") {
            Some((_, rest)) => rest,
            None => &*line,
        };
        let Some(m) = name.find(text) else {
            continue;
        };
        let repo = m.as_str().trim_end_matches(".git").to_string();
        if seen.insert(repo.clone()) {
            repos.push(repo);
        }
    }
    repos
}

pub fn extraction_prompt(
    definition: &str,
    awesome_name: &str,
    readme: &str,
    readme_char_budget: usize,
) -> ClassificationPrompt {
    let user = format!(
        "Please read this README file and extract a list of **open-source agent repositories** mentioned in it.\n\n\
         ## What is an Agent Repository\n\n\
         {definition}\n\n\
         ## Task\n\n\
         This is the README content of a GitHub repository `{awesome_name}`. \
         Please extract all **open-source repositories that fit the Agent Repository definition**.\n\n\
         ## README Content:\n\n\
         ```\n{readme}\n```\n\n\
         ## Requirements\n\n\
         1. Only extract explicitly mentioned GitHub repositories (format: username/reponame)\n\
         2. Only include repositories that fit the Agent Repository definition (containing LLM agent systems or related frameworks)\n\
         3. Do not include documentation, tutorials, paper collections, or other non-code repositories\n\
         4. Do not include pure utility libraries (unless they are agent frameworks)\n\
         5. One repository per line, format: owner/repo\n\n\
         Please output the repository list directly, one per line, without any other explanations. \
         If no qualifying repositories are found, output \"NONE\" only.\n\n\
         Repository list:",
        definition = definition.trim(),
        readme = truncate_chars(readme, readme_char_budget),
    );
    ClassificationPrompt {
        system: EXTRACTION_SYSTEM_PROMPT.to_string(),
        user,
    }
}

pub struct AwesomeExtractor {
    backend: Arc<dyn ClassifierBackend>,
    definition: String,
    readme_char_budget: usize,
    excluded: KeywordMatcher,
}

impl AwesomeExtractor {
    pub fn new(
        backend: Arc<dyn ClassifierBackend>,
        definition: impl Into<String>,
        readme_char_budget: usize,
        excluded: KeywordMatcher,
    ) -> Self {
        Self {
            backend,
            definition: definition.into(),
            readme_char_budget,
            excluded,
        }
    }

    /// Agent repositories named by the backend for one awesome list.
    ///
    /// When the README links to GitHub repositories, only linked names are
    /// kept. A backend failure yields an empty list.
    pub async fn extract(&self, awesome_name: &str, readme: &str) -> Vec<String> {
        let links = github_links(readme);
        let prompt = extraction_prompt(&self.definition, awesome_name, readme, self.readme_char_budget);

        let response = match self
            .backend
            .complete(&prompt.system, &prompt.user, EXTRACTION_TEMPERATURE)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(awesome = awesome_name, error = %e, "Extraction failed");
                return Vec::new();
            }
        };

        let parsed = parse_repo_list(&response);
        let total = parsed.len();
        let repos: Vec<String> = parsed
            .into_iter()
            .filter(|repo| links.is_empty() || links.contains(repo))
            .filter(|repo| self.excluded.first_match(repo).is_none())
            .collect();

        tracing::info!(
            awesome = awesome_name,
            links = links.len(),
            named = total,
            kept = repos.len(),
            "Extracted repositories"
        );
        repos
    }
}
