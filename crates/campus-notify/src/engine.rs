use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use campus_db::Database;
use campus_gateway::Registry;
use campus_types::events::GatewayEvent;
use campus_types::models::{Category, Notification};

use crate::audience::{AudienceResolver, Resolved};
use crate::directory::RecipientDirectory;
use crate::email::{EmailMessage, Mailer};
use crate::event::{DeliveryEvent, EmailPayload, Target};

/// Hard failures only. Everything else — a single failed log write in a
/// batch, a push to a disconnected client, a dropped email — is logged and
/// absorbed; notification delivery is never a precondition for the domain
/// action that triggered it.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("notification message is empty")]
    EmptyMessage,

    #[error("audience resolution failed: {0}")]
    Resolution(#[source] anyhow::Error),

    #[error("log write failed for every recipient")]
    AllWritesFailed,
}

/// Per-recipient outcome of one dispatch.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub recipient: Uuid,
    /// Durable record written. The only flag that gates the others: nothing
    /// is pushed or emailed before its record exists.
    pub logged: bool,
    /// At least one live session accepted the push.
    pub pushed: bool,
    /// Email handed to the mail queue. Says nothing about relay outcome —
    /// that is resolved later by the mail worker and never reported back.
    pub email_queued: bool,
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub deliveries: Vec<Delivery>,
    pub records_written: usize,
    pub system_wide: bool,
}

/// The fan-out core: resolves an event's audience, then per recipient
/// writes the log row, pushes to live sessions and queues email. Recipients
/// are independent — they run concurrently and one failure never touches
/// the rest.
pub struct Engine {
    db: Arc<Database>,
    registry: Registry,
    directory: Arc<dyn RecipientDirectory>,
    resolver: AudienceResolver,
    mailer: Mailer,
}

impl Engine {
    pub fn new(
        db: Arc<Database>,
        registry: Registry,
        directory: Arc<dyn RecipientDirectory>,
        mailer: Mailer,
    ) -> Self {
        let resolver = AudienceResolver::new(directory.clone());
        Self {
            db,
            registry,
            directory,
            resolver,
            mailer,
        }
    }

    /// Single-recipient convenience surface. `recipient = None` means
    /// system-wide.
    pub async fn notify(
        &self,
        recipient: Option<Uuid>,
        message: impl Into<String>,
        category: Category,
        email: Option<EmailPayload>,
    ) -> Result<DispatchReport, DispatchError> {
        let target = match recipient {
            Some(id) => Target::User(id),
            None => Target::SystemWide,
        };
        self.dispatch(DeliveryEvent {
            target,
            message: message.into(),
            category,
            email,
        })
        .await
    }

    /// Fixed-list convenience surface.
    pub async fn notify_many(
        &self,
        recipients: Vec<Uuid>,
        message: impl Into<String>,
        category: Category,
        email: Option<EmailPayload>,
    ) -> Result<DispatchReport, DispatchError> {
        self.dispatch(DeliveryEvent {
            target: Target::Users(recipients),
            message: message.into(),
            category,
            email,
        })
        .await
    }

    pub async fn dispatch(&self, event: DeliveryEvent) -> Result<DispatchReport, DispatchError> {
        if event.message.trim().is_empty() {
            return Err(DispatchError::EmptyMessage);
        }

        let resolved = self
            .resolver
            .resolve(&event.target)
            .await
            .map_err(DispatchError::Resolution)?;

        match resolved {
            Resolved::SystemWide => self.dispatch_system_wide(&event).await,
            Resolved::Recipients(recipients) => self.dispatch_to(recipients, &event).await,
        }
    }

    /// One NULL-recipient record regardless of audience size; admins find it
    /// through the read-time scope join. Pushed to every connected client,
    /// never emailed.
    async fn dispatch_system_wide(
        &self,
        event: &DeliveryEvent,
    ) -> Result<DispatchReport, DispatchError> {
        let record = new_record(None, event);

        if let Err(e) = self.write_record(&record).await {
            error!("System-wide log write failed: {}", e);
            return Err(DispatchError::AllWritesFailed);
        }

        self.registry.broadcast(GatewayEvent::NewNotification {
            notification: record,
        });

        Ok(DispatchReport {
            deliveries: Vec::new(),
            records_written: 1,
            system_wide: true,
        })
    }

    async fn dispatch_to(
        &self,
        recipients: Vec<Uuid>,
        event: &DeliveryEvent,
    ) -> Result<DispatchReport, DispatchError> {
        // Zero recipients is a valid no-op, not a failure
        if recipients.is_empty() {
            return Ok(DispatchReport::default());
        }

        let deliveries = join_all(
            recipients
                .iter()
                .map(|&recipient| self.deliver_one(recipient, event)),
        )
        .await;

        let records_written = deliveries.iter().filter(|d| d.logged).count();
        if records_written == 0 {
            return Err(DispatchError::AllWritesFailed);
        }

        Ok(DispatchReport {
            deliveries,
            records_written,
            system_wide: false,
        })
    }

    async fn deliver_one(&self, recipient: Uuid, event: &DeliveryEvent) -> Delivery {
        let record = new_record(Some(recipient), event);

        // Log write happens-before push and email: a client refreshing its
        // list after a push must find the record.
        if let Err(e) = self.write_record(&record).await {
            error!("Log write failed for {}: {}", recipient, e);
            return Delivery {
                recipient,
                logged: false,
                pushed: false,
                email_queued: false,
            };
        }

        let pushed = self
            .registry
            .send_to_user(
                recipient,
                GatewayEvent::NewNotification {
                    notification: record,
                },
            )
            .await;

        let email_queued = match &event.email {
            Some(payload) => self.queue_email(recipient, payload).await,
            None => false,
        };

        Delivery {
            recipient,
            logged: true,
            pushed,
            email_queued,
        }
    }

    /// Hands the email to the bounded queue; the dispatch call never waits
    /// on the relay. Opted-out or address-less recipients are skipped.
    async fn queue_email(&self, recipient: Uuid, payload: &EmailPayload) -> bool {
        let pref = match self.directory.email_preference(recipient).await {
            Ok(Some(pref)) => pref,
            Ok(None) => {
                warn!("No directory entry for {}, skipping email", recipient);
                return false;
            }
            Err(e) => {
                warn!("Email preference lookup failed for {}: {}", recipient, e);
                return false;
            }
        };

        let Some(address) = pref.deliverable() else {
            return false;
        };

        self.mailer.enqueue(EmailMessage {
            to: address.to_string(),
            subject: payload.subject.clone(),
            title: payload.title.clone(),
            body: payload.body.clone(),
            action_link: payload.action_link.clone(),
        })
    }

    async fn write_record(&self, record: &Notification) -> anyhow::Result<()> {
        let db = self.db.clone();
        let id = record.id.to_string();
        let recipient = record.recipient.map(|r| r.to_string());
        let message = record.message.clone();
        let category = record.category.as_str();
        let created_at = record.created_at.to_rfc3339();

        tokio::task::spawn_blocking(move || {
            db.insert_notification(&id, recipient.as_deref(), &message, category, &created_at)
        })
        .await?
    }
}

fn new_record(recipient: Option<Uuid>, event: &DeliveryEvent) -> Notification {
    Notification {
        id: Uuid::new_v4(),
        recipient,
        message: event.message.clone(),
        category: event.category,
        read: false,
        created_at: Utc::now(),
    }
}
