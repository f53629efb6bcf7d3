use std::path::PathBuf;

use crate::error::CoreError;
use crate::queue::QueueManager;
use crate::store::{Database, PredictedScore};

use super::artifact::ModelArtifact;

const BATCH_SIZE: i64 = 256;

pub struct ScorerReport {
    pub scored: usize,
}

/// Computes and persists per-model scores.
pub struct Scorer {
    model_dir: PathBuf,
}

impl Scorer {
    pub fn new(model_dir: PathBuf) -> Self {
        Self { model_dir }
    }

    /// Score every active model against articles missing a score row for
    /// it. `force` rescopes the selection to every article with an
    /// embedding, overwriting existing rows, rather than only the
    /// uncovered ones; without `force`, existing rows are never
    /// overwritten.
    pub async fn run_once(
        &self,
        db: &Database,
        queue: &QueueManager,
        force: bool,
    ) -> Result<ScorerReport, CoreError> {
        let models = db.list_active_models().await.map_err(CoreError::from)?;
        let mut total_scored = 0;

        for model in &models {
            // Loaded once per driver tick and held by reference for the
            // duration of this model's batch loop.
            let artifact = ModelArtifact::load(&self.model_dir, model.id)?;
            let channels = db.list_channels_for_model(model.id).await.map_err(CoreError::from)?;

            let mut offset = 0i64;
            loop {
                let candidates = if force {
                    let batch = db
                        .articles_with_embedding(offset, BATCH_SIZE)
                        .await
                        .map_err(CoreError::from)?;
                    offset += BATCH_SIZE;
                    batch
                } else {
                    db.articles_missing_score(model.id, BATCH_SIZE)
                        .await
                        .map_err(CoreError::from)?
                };
                if candidates.is_empty() {
                    break;
                }

                let mut scores = Vec::with_capacity(candidates.len());
                for article in &candidates {
                    let Some(embedding) = db.get_embedding(article.id).await.map_err(CoreError::from)? else {
                        continue;
                    };
                    let vector = embedding.vector.to_vec();
                    let standardized = artifact.standardize(&vector)?;
                    let score = artifact.predict(&standardized);
                    scores.push(PredictedScore { article_id: article.id, model_id: model.id, score });
                }

                db.upsert_scores(&scores).await.map_err(CoreError::from)?;
                total_scored += scores.len();

                for PredictedScore { article_id, score, .. } in &scores {
                    for channel in &channels {
                        if *score >= channel.score_threshold {
                            queue.enqueue(db, *article_id, channel.id).await?;
                        }
                    }
                }

                // Without `force`, the next iteration re-queries the same
                // "missing" filter, which shrinks as rows are written, so
                // no offset bookkeeping is needed on that path.
                if candidates.len() < BATCH_SIZE as usize && !force {
                    break;
                }
            }
        }

        Ok(ScorerReport { scored: total_scored })
    }
}
