//! Rejects near-duplicate candidate articles.

use chrono::{DateTime, Utc};

use crate::feed::CandidateArticle;
use crate::store::{Database, NewArticle};

#[derive(Debug, Clone, Copy)]
pub struct DedupeConfig {
    pub window_days: i64,
    pub title_threshold: f64,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self { window_days: 30, title_threshold: 0.92 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    ExternalId,
    Link,
    FuzzyTitle,
}

pub struct Deduper {
    config: DedupeConfig,
}

impl Deduper {
    pub fn new(config: DedupeConfig) -> Self {
        Self { config }
    }

    /// Normalize a title the same way on both sides of a comparison:
    /// lowercase, strip punctuation, collapse whitespace runs.
    pub fn normalize_title(title: &str) -> String {
        let mut out = String::with_capacity(title.len());
        let mut last_was_space = false;
        for c in title.chars() {
            if c.is_alphanumeric() {
                out.extend(c.to_lowercase());
                last_was_space = false;
            } else if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        }
        out.trim().to_string()
    }

    /// Admit a candidate into the store unless it matches an existing
    /// Article by `external_id`, `link`, or fuzzy title within the
    /// configured window. Returns the rejection reason when suppressed.
    pub async fn admit(
        &self,
        db: &Database,
        candidate: &CandidateArticle,
    ) -> Result<Result<i64, RejectReason>, sqlx::Error> {
        if db
            .get_article_by_external_id(&candidate.external_id)
            .await?
            .is_some()
        {
            return Ok(Err(RejectReason::ExternalId));
        }

        if let Some(link) = &candidate.link {
            if db.get_article_by_link(link).await?.is_some() {
                return Ok(Err(RejectReason::Link));
            }
        }

        let since: DateTime<Utc> = Utc::now() - chrono::Duration::days(self.config.window_days);
        let recent = db.recent_titles_since(since).await?;
        let normalized_candidate = Self::normalize_title(&candidate.title);
        for (_, existing_title) in &recent {
            let normalized_existing = Self::normalize_title(existing_title);
            let similarity = strsim::jaro_winkler(&normalized_candidate, &normalized_existing);
            if similarity >= self.config.title_threshold {
                return Ok(Err(RejectReason::FuzzyTitle));
            }
        }

        let new_article = NewArticle {
            external_id: candidate.external_id.clone(),
            title: candidate.title.clone(),
            content: candidate.content.clone(),
            authors: candidate.authors.clone(),
            origin: candidate.link.clone().unwrap_or_default(),
            link: candidate.link.clone().unwrap_or_default(),
            published: candidate.published,
        };
        let id = db.upsert_article(&new_article, false).await?;
        Ok(Ok(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        let a = Deduper::normalize_title("Sparse Attention: A Survey!");
        let b = Deduper::normalize_title("sparse attention - a survey");
        assert_eq!(a, b);
    }

    #[test]
    fn similar_titles_exceed_threshold() {
        let a = Deduper::normalize_title("Attention Is All You Need");
        let b = Deduper::normalize_title("Attention is all you need.");
        let sim = strsim::jaro_winkler(&a, &b);
        assert!(sim >= DedupeConfig::default().title_threshold);
    }

    #[test]
    fn unrelated_titles_fall_below_threshold() {
        let a = Deduper::normalize_title("Graph Neural Networks for Molecules");
        let b = Deduper::normalize_title("A Theory of Legal Contract Interpretation");
        let sim = strsim::jaro_winkler(&a, &b);
        assert!(sim < DedupeConfig::default().title_threshold);
    }
}
