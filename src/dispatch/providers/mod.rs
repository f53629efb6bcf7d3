pub mod chat_a;
pub mod chat_b;
pub mod email;

use async_trait::async_trait;

use crate::store::{Article, Channel};

/// A rendered, transport-ready notification body.
#[derive(Debug, Clone)]
pub enum Payload {
    Json(serde_json::Value),
    Email { subject: String, html: String, text: String },
}

/// Result of a transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Ok,
    Retriable,
    Permanent,
}

/// One of `{chat-A, chat-B, email}`. Detection is by
/// endpoint: hostname match for chat providers, `mailto:` for email,
/// unknown endpoints default to chat-A for backward compatibility.
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    fn render(&self, article: &Article, score: f64, channel: &Channel) -> Payload;
    async fn send(&self, payload: &Payload, endpoint: &str) -> SendOutcome;
}

/// A single article rendered as chat-A or chat-B's "more like this" link
/// back to the labeling UI.
pub fn feedback_url(base_url: &str, article_id: i64) -> String {
    format!("{base_url}/label/{article_id}")
}

pub fn score_bucket(score: f64) -> &'static str {
    if score >= 0.8 {
        "high"
    } else if score >= 0.5 {
        "medium"
    } else {
        "low"
    }
}

pub enum ProviderKind {
    ChatA,
    ChatB,
    Email,
}

/// `mailto:` scheme selects Email; a hostname containing `chat-b` selects
/// chat-B; everything else (including unrecognized hosts) defaults to
/// chat-A.
pub fn detect(endpoint: &str) -> ProviderKind {
    if endpoint.starts_with("mailto:") {
        return ProviderKind::Email;
    }
    if let Ok(url) = url::Url::parse(endpoint) {
        if let Some(host) = url.host_str() {
            if host.contains("chat-b") {
                return ProviderKind::ChatB;
            }
        }
    }
    ProviderKind::ChatA
}
