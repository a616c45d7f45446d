pub mod classifier;
pub mod config;
pub mod error;
pub mod gate;
pub mod keywords;
pub mod models;

pub use classifier::{
    create_classifier, parse_yes_no, ChatCompletionClient, ClassifierBackend, ClassifierConfig,
    ClassifierError,
};
pub use config::RepohookConfig;
pub use error::RepohookError;
pub use gate::{GateConfig, GateError, GraphQlResponse, RequestGate};
pub use models::{
    AiJudgment, Decision, Evidence, EvidenceConfidence, EvidenceKind, EvidenceSource, Issue,
    PullRequestRecord, RepositoryCandidate, Verdict,
};
