//! Computes and persists per-model scores.

pub mod artifact;
pub mod scorer;

pub use artifact::{ModelArtifact, PredictorKind};
pub use scorer::{Scorer, ScorerReport};
