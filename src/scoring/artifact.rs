use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The on-disk encoding of a trained model: predictor plus input
/// standardizer, serialized with `bincode` as an opaque blob with a
/// fixed input dimension.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub dim: usize,
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
    pub predictor: PredictorKind,
}

/// The predictor variants this rewrite implements. Anything trained
/// elsewhere with an unsupported kind fails to load rather than silently
/// producing garbage scores.
#[derive(Debug, Serialize, Deserialize)]
pub enum PredictorKind {
    /// Logistic regression over the standardized embedding: sigmoid of
    /// `weights . x + bias`.
    LogisticLinear { weights: Vec<f64>, bias: f64 },
}

impl ModelArtifact {
    pub fn path(model_dir: &Path, model_id: i64) -> PathBuf {
        model_dir.join(format!("model-{model_id}.bin"))
    }

    pub fn load(model_dir: &Path, model_id: i64) -> Result<Self, CoreError> {
        let path = Self::path(model_dir, model_id);
        let bytes = std::fs::read(&path)
            .map_err(|e| CoreError::Permanent(format!("reading {}: {e}", path.display())))?;
        bincode::deserialize(&bytes)
            .map_err(|e| CoreError::SchemaMismatch(format!("artifact {}: {e}", path.display())))
    }

    pub fn save(&self, model_dir: &Path, model_id: i64) -> Result<(), CoreError> {
        let path = Self::path(model_dir, model_id);
        let bytes = bincode::serialize(self)
            .map_err(|e| CoreError::InvariantViolation(format!("serializing artifact: {e}")))?;
        std::fs::write(&path, bytes)
            .map_err(|e| CoreError::Permanent(format!("writing {}: {e}", path.display())))
    }

    /// Standardize a raw embedding vector in place: `(x - mean) / std`.
    pub fn standardize(&self, vector: &[f32]) -> Result<Vec<f64>, CoreError> {
        if vector.len() != self.dim {
            return Err(CoreError::SchemaMismatch(format!(
                "embedding has {} dims, model expects {}",
                vector.len(),
                self.dim
            )));
        }
        Ok(vector
            .iter()
            .zip(self.mean.iter())
            .zip(self.std.iter())
            .map(|((&x, &mean), &std)| {
                let std = if std.abs() < f64::EPSILON { 1.0 } else { std };
                (x as f64 - mean) / std
            })
            .collect())
    }

    /// Evaluate the predictor and clamp the result to [0,1].
    pub fn predict(&self, standardized: &[f64]) -> f64 {
        let raw = match &self.predictor {
            PredictorKind::LogisticLinear { weights, bias } => {
                let dot: f64 = weights.iter().zip(standardized).map(|(w, x)| w * x).sum();
                sigmoid(dot + bias)
            }
        };
        raw.clamp(0.0, 1.0)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> ModelArtifact {
        ModelArtifact {
            dim: 2,
            mean: vec![0.0, 0.0],
            std: vec![1.0, 1.0],
            predictor: PredictorKind::LogisticLinear { weights: vec![1.0, -1.0], bias: 0.0 },
        }
    }

    #[test]
    fn predict_is_clamped_to_unit_interval() {
        let a = artifact();
        let standardized = a.standardize(&[100.0, -100.0]).unwrap();
        let score = a.predict(&standardized);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn standardize_rejects_dimension_mismatch() {
        let a = artifact();
        let err = a.standardize(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, CoreError::SchemaMismatch(_)));
    }

    #[test]
    fn zero_variance_dimension_does_not_divide_by_zero() {
        let mut a = artifact();
        a.std = vec![0.0, 1.0];
        let standardized = a.standardize(&[5.0, 5.0]).unwrap();
        assert!(standardized[0].is_finite());
    }
}
