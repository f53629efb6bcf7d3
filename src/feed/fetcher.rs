use std::time::Duration;

use futures::stream::{self, StreamExt};
use thiserror::Error;

use super::parser::{parse_feed, CandidateArticle, ParseError};
use crate::store::{Database, FeedSource};

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024;
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("http error: status {0}")]
    HttpStatus(u16),
    #[error("request timed out")]
    Timeout,
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("response exceeded {0} bytes")]
    ResponseTooLarge(usize),
    #[error("another worker already holds this source's lock")]
    Locked,
}

/// Outcome of fetching a single source. FeedFetcher never writes
/// Articles itself — surviving candidates are handed to the Deduper.
pub struct FetchOutcome {
    pub source_id: i64,
    pub result: Result<Vec<CandidateArticle>, FetchError>,
}

/// Polls configured feed sources.
pub struct FeedFetcher {
    client: reqwest::Client,
    concurrency: usize,
}

impl FeedFetcher {
    pub fn new(client: reqwest::Client, concurrency: usize) -> Self {
        Self { client, concurrency }
    }

    /// Fetch every given source concurrently (bounded by `concurrency`).
    /// `last_checked` is advanced for a source regardless of success or
    /// failure, so a source that keeps erroring does not tight-loop.
    pub async fn refresh_all(&self, db: &Database, sources: &[FeedSource]) -> Vec<FetchOutcome> {
        stream::iter(sources.iter().cloned())
            .map(|source| {
                let client = self.client.clone();
                let db = db.clone();
                async move {
                    let result = Self::fetch_one(&db, &client, &source).await;
                    if let Err(e) = &result {
                        if !matches!(e, FetchError::Locked) {
                            tracing::warn!(
                                source_id = source.id,
                                url = %source.url,
                                error = %e,
                                "feed fetch failed"
                            );
                            let _ = db
                                .record_event(
                                    crate::store::EventSeverity::Warning,
                                    &format!("fetch failed: {e}"),
                                    None,
                                    Some(source.id),
                                )
                                .await;
                        }
                    }
                    if !matches!(result, Err(FetchError::Locked)) {
                        let _ = db.touch_feed_source(source.id).await;
                    }
                    FetchOutcome { source_id: source.id, result }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    async fn fetch_one(
        db: &Database,
        client: &reqwest::Client,
        source: &FeedSource,
    ) -> Result<Vec<CandidateArticle>, FetchError> {
        // A single source must never be fetched by two workers
        // concurrently.
        let _lock = match db
            .try_advisory_lock(&format!("papersorter/feed_source/{}", source.id))
            .await
        {
            Ok(Some(lock)) => lock,
            Ok(None) => return Err(FetchError::Locked),
            Err(_) => return Err(FetchError::Locked),
        };

        let response = tokio::time::timeout(FETCH_TIMEOUT, client.get(&source.url).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let bytes = read_limited(response, MAX_FEED_SIZE).await?;
        let candidates = parse_feed(&bytes)?;
        Ok(candidates)
    }
}

async fn read_limited(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, FetchError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><guid>1</guid><title>Test</title></item>
</channel></rss>"#;

    #[tokio::test]
    async fn http_error_surfaces_as_http_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let source = FeedSource {
            id: 1,
            name: "test".into(),
            url: mock_server.uri(),
            kind: "rss".into(),
            last_checked: None,
            is_active: true,
            credentials: None,
        };

        let result = FeedFetcher::fetch_one_without_lock_for_test(&client, &source).await;
        assert!(matches!(result, Err(FetchError::HttpStatus(404))));
    }

    #[tokio::test]
    async fn well_formed_feed_yields_one_candidate() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let source = FeedSource {
            id: 1,
            name: "test".into(),
            url: mock_server.uri(),
            kind: "rss".into(),
            last_checked: None,
            is_active: true,
            credentials: None,
        };

        let result = FeedFetcher::fetch_one_without_lock_for_test(&client, &source)
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
    }

    impl FeedFetcher {
        /// Test-only path that skips the advisory lock, since unit tests
        /// run without a live database.
        async fn fetch_one_without_lock_for_test(
            client: &reqwest::Client,
            source: &FeedSource,
        ) -> Result<Vec<CandidateArticle>, FetchError> {
            let response = client.get(&source.url).send().await.map_err(FetchError::Network)?;
            if !response.status().is_success() {
                return Err(FetchError::HttpStatus(response.status().as_u16()));
            }
            let bytes = read_limited(response, MAX_FEED_SIZE).await?;
            Ok(parse_feed(&bytes)?)
        }
    }
}
