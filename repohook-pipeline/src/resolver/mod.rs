//! Linkage resolvers — one ordered, short-circuiting predicate chain per item.
//!
//! A verdict depends on the adapters enabled for the run: the same issue can
//! be accepted with the git-log adapter and rejected without it. Each issue
//! verdict records the sources it consulted and an [`EvidenceConfidence`] so
//! that difference stays visible in the output.
//!
//! [`EvidenceConfidence`]: repohook_core::EvidenceConfidence

mod issue;
mod repository;

pub use issue::IssueResolver;
pub use repository::RepoResolver;
