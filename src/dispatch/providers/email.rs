use async_trait::async_trait;
use chrono::Utc;
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;

use super::{feedback_url, NotificationProvider, Payload, SendOutcome};
use crate::config::{SmtpConfig, SmtpEncryption};
use crate::store::{Article, Channel};

/// Batches multiple articles into a single digest email per dispatch
/// cycle rather than sending one message per article.
pub struct EmailProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    feedback_base_url: String,
}

impl EmailProvider {
    pub fn new(config: &SmtpConfig, feedback_base_url: String) -> Result<Self, String> {
        let mut builder = match config.encryption {
            SmtpEncryption::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| e.to_string())?,
            SmtpEncryption::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                    .map_err(|e| e.to_string())?
            }
            SmtpEncryption::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            }
        };
        builder = builder.port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            ));
        }
        let from = config
            .from_address
            .parse()
            .map_err(|_| format!("invalid from_address: {}", config.from_address))?;

        Ok(Self { transport: builder.build(), from, feedback_base_url })
    }

    /// Render a digest for a channel from every claimed article this
    /// cycle, subject templated with the current date.
    pub fn render_digest(&self, articles: &[(Article, f64)], channel: &Channel) -> Payload {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        let subject = format!("PaperSorter digest for {} — {date}", channel.name);

        let mut html = String::from("<html><body><h1>New papers</h1><ul>");
        let mut text = String::from("New papers\n\n");
        for (article, score) in articles {
            let url = feedback_url(&self.feedback_base_url, article.id);
            html.push_str(&format!(
                "<li><a href=\"{}\">{}</a> ({:.0}%) — <a href=\"{}\">more like this</a></li>",
                article.link,
                article.title,
                score * 100.0,
                url
            ));
            text.push_str(&format!(
                "- {} ({:.0}%): {} [more like this: {}]\n",
                article.title,
                score * 100.0,
                article.link,
                url
            ));
        }
        html.push_str("</ul></body></html>");

        Payload::Email { subject, html, text }
    }

    pub async fn send_digest(&self, payload: &Payload, to: &str) -> SendOutcome {
        let Payload::Email { subject, html, text } = payload else {
            return SendOutcome::Permanent;
        };

        let Ok(to_mailbox) = to.trim_start_matches("mailto:").parse::<Mailbox>() else {
            return SendOutcome::Permanent;
        };

        let message = Message::builder()
            .from(self.from.clone())
            .to(to_mailbox)
            .subject(subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_PLAIN).body(text.clone()))
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_HTML).body(html.clone())),
            );

        let message = match message {
            Ok(m) => m,
            Err(_) => return SendOutcome::Permanent,
        };

        match tokio::time::timeout(std::time::Duration::from_secs(10), self.transport.send(message)).await {
            Err(_) => SendOutcome::Retriable,
            Ok(Err(_)) => SendOutcome::Retriable,
            Ok(Ok(_)) => SendOutcome::Ok,
        }
    }
}

#[async_trait]
impl NotificationProvider for EmailProvider {
    fn render(&self, article: &Article, score: f64, channel: &Channel) -> Payload {
        self.render_digest(&[(article.clone(), score)], channel)
    }

    async fn send(&self, payload: &Payload, endpoint: &str) -> SendOutcome {
        self.send_digest(payload, endpoint).await
    }
}
