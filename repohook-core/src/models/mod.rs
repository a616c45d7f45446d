pub mod evidence;
pub mod issue;
pub mod pull_request;
pub mod repository;
pub mod snapshot;
pub mod verdict;

pub use evidence::{Evidence, EvidenceKind, EvidenceSource};
pub use issue::Issue;
pub use pull_request::PullRequestRecord;
pub use repository::RepositoryCandidate;
pub use verdict::{AiJudgment, Decision, EvidenceConfidence, Verdict};
