use std::time::Duration;

use rand::Rng;

use super::client::{EmbeddingClient, EmbeddingClientError};
use crate::error::CoreError;
use crate::store::{Article, Database};

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(60);
const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy)]
pub struct EmbedderConfig {
    pub batch_size: i64,
    pub dimensions: usize,
    /// Characters allowed in the embedding input text before truncation,
    /// sourced from `embedding_api.char_budget`.
    pub char_budget: usize,
}

/// Ensures every Article has exactly one Embedding.
pub struct Embedder {
    client: EmbeddingClient,
    config: EmbedderConfig,
}

pub struct EmbedderReport {
    pub embedded: usize,
    pub requeued: usize,
}

impl Embedder {
    pub fn new(client: EmbeddingClient, config: EmbedderConfig) -> Self {
        Self { client, config }
    }

    /// Build the embedding input for one article: title, authors
    /// (comma-joined), origin, a blank line, then content/abstract,
    /// truncated to `char_budget`.
    pub fn build_input(article: &Article, char_budget: usize) -> String {
        let mut input = format!(
            "{}\n{}\n{}\n\n{}",
            article.title,
            article.authors.as_deref().unwrap_or(""),
            article.origin,
            article.content.as_deref().unwrap_or("")
        );
        if input.len() > char_budget {
            let mut end = char_budget;
            while !input.is_char_boundary(end) {
                end -= 1;
            }
            input.truncate(end);
        }
        input
    }

    /// One tick: pull up to `batch_size` articles lacking embeddings,
    /// embed them, persist successes, and leave failures for the next
    /// tick.
    pub async fn run_once(&self, db: &Database) -> Result<EmbedderReport, CoreError> {
        let articles = db
            .articles_missing_embedding(self.config.batch_size)
            .await
            .map_err(CoreError::Database)?;
        if articles.is_empty() {
            return Ok(EmbedderReport { embedded: 0, requeued: 0 });
        }

        let inputs: Vec<String> =
            articles.iter().map(|a| Self::build_input(a, self.config.char_budget)).collect();
        let vectors = match self.embed_with_backoff(&inputs).await {
            Ok(v) => v,
            Err(_) => {
                // Transient even after retries: leave the whole batch for
                // the next tick rather than fail the whole run.
                return Ok(EmbedderReport { embedded: 0, requeued: articles.len() });
            }
        };

        // Partial failure: fewer vectors returned than requested. Persist
        // what aligns by position, re-queue the rest implicitly (they
        // remain in `articles_missing_embedding` next tick).
        let paired: Vec<(i64, Vec<f32>)> = articles
            .iter()
            .zip(vectors.into_iter())
            .map(|(a, v)| (a.id, v))
            .collect();
        let requeued = articles.len() - paired.len();

        db.upsert_embeddings(&paired, self.config.dimensions).await?;

        Ok(EmbedderReport { embedded: paired.len(), requeued })
    }

    async fn embed_with_backoff(
        &self,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let mut attempt = 0;
        loop {
            match self.client.embed_batch(inputs).await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retriable() && attempt + 1 < MAX_ATTEMPTS => {
                    let delay = backoff_delay(attempt);
                    tracing::warn!(attempt = attempt, delay_ms = delay.as_millis() as u64, error = %e, "embedding request failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Exponential backoff with jitter: base 1s, cap 60s, multiplier 2,
/// jitter ±25%.
fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = BACKOFF_BASE.as_millis() as u64 * 2u64.saturating_pow(attempt);
    let capped_ms = base_ms.min(BACKOFF_CAP.as_millis() as u64);
    let jitter_frac = rand::thread_rng().gen_range(-0.25..=0.25);
    let jittered = (capped_ms as f64) * (1.0 + jitter_frac);
    Duration::from_millis(jittered.max(0.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_article(content_len: usize) -> Article {
        Article {
            id: 1,
            external_id: "e1".into(),
            title: "Title".into(),
            content: Some("x".repeat(content_len)),
            authors: Some("A, B".into()),
            origin: "arxiv".into(),
            link: "http://x".into(),
            published: Utc::now(),
            added: Utc::now(),
            tldr: None,
        }
    }

    #[test]
    fn build_input_truncates_to_budget() {
        let article = sample_article(8000 * 2);
        let input = Embedder::build_input(&article, 8000);
        assert!(input.len() <= 8000);
    }

    #[test]
    fn build_input_includes_title_and_authors() {
        let article = sample_article(10);
        let input = Embedder::build_input(&article, 8000);
        assert!(input.contains("Title"));
        assert!(input.contains("A, B"));
    }

    #[test]
    fn backoff_never_exceeds_cap_plus_jitter() {
        for attempt in 0..10 {
            let delay = backoff_delay(attempt);
            assert!(delay <= BACKOFF_CAP + BACKOFF_CAP / 4);
        }
    }
}
