pub mod candidate;
pub mod citation;
pub mod fingerprint;
pub mod sanitize;
pub mod scoring;

pub use candidate::{ActionType, Candidate, ResourceKind, ScoreBreakdown, SubjectKeys};
