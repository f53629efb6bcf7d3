use async_trait::async_trait;
use serde_json::json;

use super::{feedback_url, score_bucket, NotificationProvider, Payload, SendOutcome};
use crate::store::{Article, Channel};

/// Chat-B has a documented 30 req/min per-webhook limit that this
/// provider enforces in addition to the channel's configured token
/// bucket.
const CHAT_B_MAX_PER_MINUTE: u32 = 30;

/// Rich-embed payload with a color band by score bucket and markdown
/// action links.
pub struct ChatBProvider {
    http: reqwest::Client,
    feedback_base_url: String,
}

impl ChatBProvider {
    pub fn new(http: reqwest::Client, feedback_base_url: String) -> Self {
        Self { http, feedback_base_url }
    }

    pub fn per_webhook_rate_limit() -> u32 {
        CHAT_B_MAX_PER_MINUTE
    }

    fn color_for_bucket(bucket: &str) -> &'static str {
        match bucket {
            "high" => "#2ecc71",
            "medium" => "#f1c40f",
            _ => "#95a5a6",
        }
    }
}

#[async_trait]
impl NotificationProvider for ChatBProvider {
    fn render(&self, article: &Article, score: f64, _channel: &Channel) -> Payload {
        let url = feedback_url(&self.feedback_base_url, article.id);
        let bucket = score_bucket(score);
        Payload::Json(json!({
            "embeds": [{
                "title": article.title,
                "color": Self::color_for_bucket(bucket),
                "description": format!(
                    "**{}** — {}\n\n[Open]({}) · [More like this]({}) · [Less like this]({}?vote=down)",
                    article.origin,
                    article.authors.as_deref().unwrap_or("unknown authors"),
                    article.link,
                    url,
                    url,
                ),
                "fields": [
                    { "name": "Score", "value": format!("{:.0}%", score * 100.0) },
                ],
            }],
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
                } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS
                    || status.is_server_error()
                {
                    SendOutcome::Retriable
                } else if status == reqwest::StatusCode::NOT_FOUND
                    || status == reqwest::StatusCode::UNAUTHORIZED
                {
                    SendOutcome::Permanent
                } else {
                    SendOutcome::Retriable
                }
            }
        }
    }
}
