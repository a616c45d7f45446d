use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub html_url: String,
}

impl Issue {
    /// True when the body has any non-whitespace text.
    pub fn has_description(&self) -> bool {
        self.body
            .as_deref()
            .map(|b| !b.trim().is_empty())
            .unwrap_or(false)
    }
}
