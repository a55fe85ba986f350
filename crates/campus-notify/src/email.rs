//! Best-effort email channel.
//!
//! Outbound mail never blocks a dispatch call: messages go through a
//! bounded queue drained by a worker task. Failures are logged and never
//! retried. When SMTP is not configured the channel is replaced by a
//! logging no-op, so the engine behaves identically in every environment.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// How many pending emails the queue holds before new ones are dropped.
pub const MAIL_QUEUE_CAPACITY: usize = 256;

/// One outbound alert email.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub title: String,
    pub body: String,
    pub action_link: Option<String>,
}

#[async_trait]
pub trait EmailChannel: Send + Sync {
    async fn send_alert(&self, msg: &EmailMessage) -> Result<()>;
}

/// SMTP relay settings, read from the environment.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

impl SmtpConfig {
    /// None when the relay is not configured (any required variable absent).
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("CAMPUS_SMTP_HOST").ok()?;
        let username = std::env::var("CAMPUS_SMTP_USERNAME").ok()?;
        let password = std::env::var("CAMPUS_SMTP_PASSWORD").ok()?;
        let from_address = std::env::var("CAMPUS_SMTP_FROM").ok()?;
        let port = std::env::var("CAMPUS_SMTP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(587);

        Some(Self {
            host,
            port,
            username,
            password,
            from_address,
        })
    }
}

/// Real SMTP sender (STARTTLS + credentials).
pub struct SmtpChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpChannel {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = config
            .from_address
            .parse()
            .context("Invalid from email address")?;

        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .context("Failed to create SMTP transport")?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl EmailChannel for SmtpChannel {
    async fn send_alert(&self, msg: &EmailMessage) -> Result<()> {
        let to: Mailbox = msg.to.parse().context("Invalid to email address")?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&msg.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(build_body_text(msg)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(build_body_html(msg)),
                    ),
            )
            .context("Failed to build email message")?;

        self.transport
            .send(email)
            .await
            .context("Failed to send email via SMTP")?;

        info!(to = %msg.to, subject = %msg.subject, "Email sent");
        Ok(())
    }
}

/// Substituted when SMTP is unconfigured: logs the intended message and
/// reports success.
pub struct LogOnlyChannel;

#[async_trait]
impl EmailChannel for LogOnlyChannel {
    async fn send_alert(&self, msg: &EmailMessage) -> Result<()> {
        info!(
            to = %msg.to,
            subject = %msg.subject,
            "SMTP not configured; email not sent: {}",
            msg.title
        );
        Ok(())
    }
}

/// Pick the SMTP channel when the environment provides credentials,
/// otherwise fall back to the logging no-op.
pub fn channel_from_env() -> Arc<dyn EmailChannel> {
    match SmtpConfig::from_env() {
        Some(config) => match SmtpChannel::new(&config) {
            Ok(channel) => {
                info!("SMTP relay configured: {}:{}", config.host, config.port);
                Arc::new(channel)
            }
            Err(e) => {
                warn!("SMTP config invalid ({}), falling back to log-only email", e);
                Arc::new(LogOnlyChannel)
            }
        },
        None => {
            info!("SMTP not configured; emails will be logged instead of sent");
            Arc::new(LogOnlyChannel)
        }
    }
}

fn build_body_text(msg: &EmailMessage) -> String {
    match &msg.action_link {
        Some(link) => format!("{}\n\n{}\n\n{}", msg.title, msg.body, link),
        None => format!("{}\n\n{}", msg.title, msg.body),
    }
}

fn build_body_html(msg: &EmailMessage) -> String {
    let action = msg
        .action_link
        .as_deref()
        .map(|link| format!(r#"<p><a href="{link}">View details</a></p>"#))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 20px; }}
        .header {{ background-color: #3498db; color: white; padding: 15px; border-radius: 5px; }}
        .content {{ padding: 20px; background-color: #f9f9f9; border-radius: 5px; margin-top: 10px; }}
    </style>
</head>
<body>
    <div class="header">
        <h2>{}</h2>
    </div>
    <div class="content">
        <p>{}</p>
        {}
    </div>
</body>
</html>"#,
        msg.title, msg.body, action
    )
}

/// Bounded mail queue plus its drain worker.
///
/// `enqueue` never blocks and never fails the caller: a full queue is a
/// logged drop. One worker drains the queue; a relay failure is logged and
/// the worker moves on — no retry, no dead letter.
#[derive(Clone)]
pub struct Mailer {
    tx: mpsc::Sender<EmailMessage>,
}

impl Mailer {
    pub fn start(channel: Arc<dyn EmailChannel>) -> Self {
        Self::with_capacity(channel, MAIL_QUEUE_CAPACITY)
    }

    pub fn with_capacity(channel: Arc<dyn EmailChannel>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<EmailMessage>(capacity);

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = channel.send_alert(&msg).await {
                    warn!("Email to {} failed (not retried): {}", msg.to, e);
                }
            }
        });

        Self { tx }
    }

    /// Returns false when the message was dropped (queue full or worker gone).
    pub fn enqueue(&self, msg: EmailMessage) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                warn!("Mail queue full, dropping email to {}", msg.to);
                false
            }
            Err(mpsc::error::TrySendError::Closed(msg)) => {
                warn!("Mail worker gone, dropping email to {}", msg.to);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::{Notify, Semaphore};

    fn message(to: &str) -> EmailMessage {
        EmailMessage {
            to: to.into(),
            subject: "Marks updated".into(),
            title: "Marks updated".into(),
            body: "Your semester marks are available.".into(),
            action_link: Some("https://campus.example.edu/marks".into()),
        }
    }

    #[test]
    fn bodies_include_title_body_and_link() {
        let msg = message("s1@example.edu");

        let text = build_body_text(&msg);
        assert!(text.contains("Marks updated"));
        assert!(text.contains("https://campus.example.edu/marks"));

        let html = build_body_html(&msg);
        assert!(html.contains("<h2>Marks updated</h2>"));
        assert!(html.contains(r#"href="https://campus.example.edu/marks""#));

        let mut no_link = msg;
        no_link.action_link = None;
        assert!(!build_body_html(&no_link).contains("href"));
    }

    #[tokio::test]
    async fn log_only_channel_always_succeeds() {
        let channel = LogOnlyChannel;
        assert!(channel.send_alert(&message("x@example.edu")).await.is_ok());
    }

    /// Records deliveries; fails on addresses containing "bad".
    struct RecordingChannel {
        sent: Mutex<Vec<String>>,
        done: Semaphore,
    }

    #[async_trait]
    impl EmailChannel for RecordingChannel {
        async fn send_alert(&self, msg: &EmailMessage) -> Result<()> {
            let failed = msg.to.contains("bad");
            if !failed {
                self.sent.lock().unwrap().push(msg.to.clone());
            }
            self.done.add_permits(1);
            if failed {
                anyhow::bail!("relay rejected {}", msg.to);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn worker_drains_queue_and_survives_failures() {
        let channel = Arc::new(RecordingChannel {
            sent: Mutex::new(Vec::new()),
            done: Semaphore::new(0),
        });
        let mailer = Mailer::start(channel.clone());

        assert!(mailer.enqueue(message("a@example.edu")));
        assert!(mailer.enqueue(message("bad@example.edu")));
        assert!(mailer.enqueue(message("b@example.edu")));

        let _permits = channel.done.acquire_many(3).await.unwrap();

        let sent = channel.sent.lock().unwrap().clone();
        assert_eq!(sent, vec!["a@example.edu", "b@example.edu"]);
    }

    /// Signals when a send starts, then parks until released.
    struct ParkedChannel {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl EmailChannel for ParkedChannel {
        async fn send_alert(&self, _msg: &EmailMessage) -> Result<()> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let channel = Arc::new(ParkedChannel {
            started: Notify::new(),
            release: Notify::new(),
        });
        let mailer = Mailer::with_capacity(channel.clone(), 1);

        // Worker takes the first message and parks; queue is empty again.
        assert!(mailer.enqueue(message("a@example.edu")));
        channel.started.notified().await;

        // Second fills the single slot, third must be dropped.
        assert!(mailer.enqueue(message("b@example.edu")));
        assert!(!mailer.enqueue(message("c@example.edu")));

        channel.release.notify_one();
    }
}
