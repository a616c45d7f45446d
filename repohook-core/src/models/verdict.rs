use serde::{Deserialize, Serialize};

use super::evidence::{Evidence, EvidenceSource};
use super::pull_request::PullRequestRecord;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Reject,
    Inconclusive,
}

/// How much of the linkage evidence came from the local clone.
///
/// A verdict is a function of the adapters enabled for the run; the same
/// issue can legitimately flip between configurations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceConfidence {
    /// Local git history produced the candidates.
    Local,
    /// No local adapter was enabled.
    #[default]
    ApiOnly,
    /// A local adapter was enabled but empty; API adapters were consulted.
    DegradedToApi,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiJudgment {
    pub is_positive: bool,
    pub raw_response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub decision: Decision,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_prs: Vec<PullRequestRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub evidence_sources_used: Vec<EvidenceSource>,
    #[serde(default)]
    pub confidence: EvidenceConfidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_judgment: Option<AiJudgment>,
}

impl Verdict {
    fn with_decision(decision: Decision, reason: impl Into<String>) -> Self {
        Self {
            decision,
            reason: reason.into(),
            merged_prs: Vec::new(),
            evidence: Vec::new(),
            evidence_sources_used: Vec::new(),
            confidence: EvidenceConfidence::default(),
            ai_judgment: None,
        }
    }

    pub fn accept(reason: impl Into<String>) -> Self {
        Self::with_decision(Decision::Accept, reason)
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self::with_decision(Decision::Reject, reason)
    }

    pub fn inconclusive(reason: impl Into<String>) -> Self {
        Self::with_decision(Decision::Inconclusive, reason)
    }

    /// Worker-level failure for one item.
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self::reject(format!("error: {}", message))
    }

    pub fn is_accept(&self) -> bool {
        self.decision == Decision::Accept
    }

    pub fn merged_pr_numbers(&self) -> Vec<u64> {
        self.merged_prs.iter().map(|pr| pr.number).collect()
    }

    pub fn with_evidence(mut self, evidence: Vec<Evidence>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_sources(
        mut self,
        sources: Vec<EvidenceSource>,
        confidence: EvidenceConfidence,
    ) -> Self {
        self.evidence_sources_used = sources;
        self.confidence = confidence;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_verdict_reason_prefix() {
        let v = Verdict::error("connection reset");
        assert_eq!(v.decision, Decision::Reject);
        assert_eq!(v.reason, "error: connection reset");
    }

    #[test]
    fn test_verdict_serializes_sources() {
        let v = Verdict::accept("linked")
            .with_sources(vec![EvidenceSource::GitLog], EvidenceConfidence::Local);
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["decision"], "accept");
        assert_eq!(json["evidence_sources_used"][0], "git-log");
        assert_eq!(json["confidence"], "local");
        assert!(json.get("ai_judgment").is_none());
    }
}
