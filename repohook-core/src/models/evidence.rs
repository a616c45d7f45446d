use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EvidenceSource {
    GitLog,
    Timeline,
    ClosingCommit,
    Search,
    Description,
    Readme,
    RepositoryInfo,
}

impl EvidenceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitLog => "git-log",
            Self::Timeline => "timeline",
            Self::ClosingCommit => "closing-commit",
            Self::Search => "search",
            Self::Description => "description",
            Self::Readme => "readme",
            Self::RepositoryInfo => "repository-info",
        }
    }
}

impl fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceKind {
    LinkedPr { number: u64 },
    KeywordMatch { keyword: String },
    StarCount { stars: u64 },
}

/// One fact from one adapter. Duplicates across sources are kept here and
/// collapsed by the resolver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Evidence {
    #[serde(flatten)]
    pub kind: EvidenceKind,
    pub source: EvidenceSource,
}

impl Evidence {
    pub fn linked_pr(number: u64, source: EvidenceSource) -> Self {
        Self {
            kind: EvidenceKind::LinkedPr { number },
            source,
        }
    }

    pub fn keyword(keyword: impl Into<String>, source: EvidenceSource) -> Self {
        Self {
            kind: EvidenceKind::KeywordMatch {
                keyword: keyword.into(),
            },
            source,
        }
    }

    pub fn stars(stars: u64) -> Self {
        Self {
            kind: EvidenceKind::StarCount { stars },
            source: EvidenceSource::RepositoryInfo,
        }
    }
}
