use serde::{Deserialize, Serialize};

/// A repository under evaluation, identified by `owner/name`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RepositoryCandidate {
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stars: Option<u64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl RepositoryCandidate {
    pub fn named(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            ..Default::default()
        }
    }

    pub fn description_or_empty(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    /// `(owner, name)`, or `None` when the full name is not `owner/name`.
    pub fn owner_and_name(&self) -> Option<(&str, &str)> {
        split_full_name(&self.full_name)
    }

    /// Fill gaps from a fresher lookup without discarding what is already known.
    pub fn enrich(&mut self, info: &RepositoryCandidate) {
        if info.description.as_deref().is_some_and(|d| !d.is_empty()) {
            self.description = info.description.clone();
        }
        if info.stars.is_some() {
            self.stars = info.stars;
        }
        if info.language.is_some() {
            self.language = info.language.clone();
        }
        if !info.topics.is_empty() {
            self.topics = info.topics.clone();
        }
    }
}

pub fn split_full_name(full_name: &str) -> Option<(&str, &str)> {
    let (owner, name) = full_name.split_once('/')?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((owner, name))
}
