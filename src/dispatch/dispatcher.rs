use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use tokio::sync::Mutex;

use super::providers::{detect, ProviderKind};
use super::providers::{chat_a::ChatAProvider, chat_b::ChatBProvider, email::EmailProvider};
use super::ratelimit::TokenBucket;
use crate::config::NotificationConfig;
use crate::dedupe::Deduper;
use crate::error::CoreError;
use crate::store::{Channel, Database};

const SUPPRESSION_WINDOW_DAYS: i64 = 90;
const MAX_CONSECUTIVE_TICK_FAILURES: u32 = 3;

/// Per-channel delivery loop.
pub struct Dispatcher {
    chat_a: Arc<ChatAProvider>,
    chat_b: Arc<ChatBProvider>,
    email: Arc<EmailProvider>,
    notification: NotificationConfig,
    buckets: Mutex<HashMap<i64, TokenBucket>>,
    // Chat-B's documented per-webhook rate limit, enforced in addition to
    // the channel's general token bucket.
    chat_b_buckets: Mutex<HashMap<i64, TokenBucket>>,
    // In-memory per-process tick failure counters; intentionally not
    // persisted.
    tick_failures: Mutex<HashMap<i64, u32>>,
}

pub struct DispatchReport {
    pub delivered: usize,
    pub suppressed: usize,
    pub skipped_channels: usize,
}

impl Dispatcher {
    pub fn new(
        chat_a: ChatAProvider,
        chat_b: ChatBProvider,
        email: EmailProvider,
        notification: NotificationConfig,
    ) -> Self {
        Self {
            chat_a: Arc::new(chat_a),
            chat_b: Arc::new(chat_b),
            email: Arc::new(email),
            notification,
            buckets: Mutex::new(HashMap::new()),
            chat_b_buckets: Mutex::new(HashMap::new()),
            tick_failures: Mutex::new(HashMap::new()),
        }
    }

    pub async fn run_once(&self, db: &Database) -> Result<DispatchReport, CoreError> {
        let channels = db.list_active_channels().await.map_err(CoreError::from)?;
        let mut report = DispatchReport { delivered: 0, suppressed: 0, skipped_channels: 0 };

        for channel in &channels {
            match self.dispatch_channel(db, channel).await {
                Ok((delivered, suppressed)) => {
                    report.delivered += delivered;
                    report.suppressed += suppressed;
                    self.tick_failures.lock().await.remove(&channel.id);
                }
                Err(e) => {
                    tracing::warn!(channel_id = channel.id, error = %e, "dispatch tick failed for channel");
                    let mut failures = self.tick_failures.lock().await;
                    let count = failures.entry(channel.id).or_insert(0);
                    *count += 1;
                    if *count >= MAX_CONSECUTIVE_TICK_FAILURES {
                        report.skipped_channels += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    async fn dispatch_channel(
        &self,
        db: &Database,
        channel: &Channel,
    ) -> Result<(usize, usize), CoreError> {
        // Step 1: skip if inactive (already filtered by list_active_channels).
        // Step 2: skip if current wall-clock hour in the channel's
        // timezone is not in broadcast_hours.
        let tz: Tz = channel.timezone.parse().unwrap_or(chrono_tz::UTC);
        let local_hour = Utc::now().with_timezone(&tz).format("%H").to_string().parse::<u32>().unwrap_or(0);
        if !channel.hour_mask().is_allowed(local_hour) {
            return Ok((0, 0));
        }

        // Step 3: claim up to min(broadcast_limit, global cap) entries.
        let limit = (channel.broadcast_limit as i64).min(self.notification.global_claim_cap);
        let queued = db.claim_queued(channel.id, limit).await.map_err(CoreError::from)?;
        if queued.is_empty() {
            return Ok((0, 0));
        }

        // Step 4: suppress candidates matching a title delivered to this
        // channel within the suppression window.
        let delivered_titles = db
            .delivered_titles_for_channel(channel.id, SUPPRESSION_WINDOW_DAYS)
            .await
            .map_err(CoreError::from)?;
        let normalized_delivered: Vec<String> = delivered_titles
            .iter()
            .map(|(_, t)| Deduper::normalize_title(t))
            .collect();

        let mut delivered_count = 0;
        let mut suppressed_count = 0;
        let mut digest_batch: Vec<(crate::store::Article, f64)> = Vec::new();
        let is_email = matches!(detect(&channel.endpoint), ProviderKind::Email);

        for entry in &queued {
            let Some(article) = db.get_article(entry.feed_id).await.map_err(CoreError::from)? else {
                continue;
            };
            let normalized = Deduper::normalize_title(&article.title);
            let is_duplicate = normalized_delivered
                .iter()
                .any(|existing| strsim::jaro_winkler(&normalized, existing) >= 0.92);
            if is_duplicate {
                db.mark_delivered(entry.feed_id, entry.channel_id).await.map_err(CoreError::from)?;
                suppressed_count += 1;
                continue;
            }

            let Some(score_row) = db.get_score(entry.feed_id, channel.model_id).await.map_err(CoreError::from)? else {
                continue;
            };

            if is_email {
                digest_batch.push((article, score_row.score));
                continue;
            }

            self.throttle(channel.id).await;
            let outcome = self.send_single(channel, &article, score_row.score).await;
            delivered_count +=
                self.handle_outcome(db, channel, entry.feed_id, outcome).await?;
        }

        if is_email && !digest_batch.is_empty() {
            self.throttle(channel.id).await;
            let payload = self.email.render_digest(&digest_batch, channel);
            let outcome = self.email.send_digest(&payload, &channel.endpoint).await;
            for (article, _) in &digest_batch {
                delivered_count +=
                    self.handle_outcome(db, channel, article.id, outcome).await?;
            }
        }

        Ok((delivered_count, suppressed_count))
    }

    async fn throttle(&self, channel_id: i64) {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry(channel_id)
            .or_insert_with(|| TokenBucket::new(self.notification.global_rate_per_sec, self.notification.global_burst));
        bucket.acquire().await;
    }

    async fn throttle_chat_b(&self, channel_id: i64) {
        let mut buckets = self.chat_b_buckets.lock().await;
        let bucket = buckets.entry(channel_id).or_insert_with(|| {
            let per_minute = ChatBProvider::per_webhook_rate_limit();
            TokenBucket::new(per_minute as f64 / 60.0, per_minute)
        });
        bucket.acquire().await;
    }

    async fn send_single(
        &self,
        channel: &Channel,
        article: &crate::store::Article,
        score: f64,
    ) -> super::providers::SendOutcome {
        use super::providers::NotificationProvider;
        match detect(&channel.endpoint) {
            ProviderKind::ChatA => {
                let payload = self.chat_a.render(article, score, channel);
                self.chat_a.send(&payload, &channel.endpoint).await
            }
            ProviderKind::ChatB => {
                self.throttle_chat_b(channel.id).await;
                let payload = self.chat_b.render(article, score, channel);
                self.chat_b.send(&payload, &channel.endpoint).await
            }
            ProviderKind::Email => unreachable!("email is batched separately"),
        }
    }

    /// Steps 7-9: translate a provider outcome into store mutations.
    /// Returns 1 if the article was delivered, 0 otherwise.
    async fn handle_outcome(
        &self,
        db: &Database,
        channel: &Channel,
        article_id: i64,
        outcome: super::providers::SendOutcome,
    ) -> Result<usize, CoreError> {
        use super::providers::SendOutcome;
        match outcome {
            SendOutcome::Ok => {
                db.mark_delivered(article_id, channel.id).await.map_err(CoreError::from)?;
                Ok(1)
            }
            SendOutcome::Retriable => {
                // Left queued; in-memory tick-failure counter is tracked
                // at the channel level in `run_once`.
                Ok(0)
            }
            SendOutcome::Permanent => {
                db.deactivate_channel(channel.id).await.map_err(CoreError::from)?;
                db.record_event(
                    crate::store::EventSeverity::Error,
                    &format!("channel {} deactivated after permanent delivery failure", channel.id),
                    Some(channel.id),
                    None,
                )
                .await
                .map_err(CoreError::from)?;
                Ok(0)
            }
        }
    }
}
