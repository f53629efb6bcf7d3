use async_trait::async_trait;
use serde_json::json;

use super::{feedback_url, score_bucket, NotificationProvider, Payload, SendOutcome};
use crate::store::{Article, Channel};

/// Blocks-style payload: title, origin, authors, abstract, and four
/// action buttons.
pub struct ChatAProvider {
    http: reqwest::Client,
    feedback_base_url: String,
}

impl ChatAProvider {
    pub fn new(http: reqwest::Client, feedback_base_url: String) -> Self {
        Self { http, feedback_base_url }
    }
}

#[async_trait]
impl NotificationProvider for ChatAProvider {
    fn render(&self, article: &Article, score: f64, _channel: &Channel) -> Payload {
        let url = feedback_url(&self.feedback_base_url, article.id);
        Payload::Json(json!({
            "blocks": [
                {
                    "type": "section",
                    "text": format!("*{}*\n{} — {}", article.title, article.origin,
                        article.authors.as_deref().unwrap_or("unknown authors")),
                    "score_pct": (score * 100.0).round(),
                    "score_bucket": score_bucket(score),
                },
                {
                    "type": "abstract",
                    "text": article.tldr.as_deref().or(article.content.as_deref()).unwrap_or(""),
                },
                {
                    "type": "actions",
                    "elements": [
                        { "text": "Open", "url": &article.link },
                        { "text": "More like this", "url": &url },
                        { "text": "Less like this", "url": format!("{url}?vote=down") },
                        { "text": "Mark read", "url": format!("{url}?ack=1") },
                    ],
                },
            ],
        }))
    }

    async fn send(&self, payload: &Payload, endpoint: &str) -> SendOutcome {
        let Payload::Json(body) = payload else {
            return SendOutcome::Permanent;
        };
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            self.http.post(endpoint).json(body).send(),
        )
        .await;

        match result {
            Err(_) => SendOutcome::Retriable,
            Ok(Err(_)) => SendOutcome::Retriable,
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_success() {
                    SendOutcome::Ok
                } else if status == reqwest::StatusCode::NOT_FOUND
                    || status == reqwest::StatusCode::UNAUTHORIZED
                    || status == reqwest::StatusCode::FORBIDDEN
                {
                    SendOutcome::Permanent
                } else {
                    SendOutcome::Retriable
                }
            }
        }
    }
}
