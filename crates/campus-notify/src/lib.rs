//! Notification fan-out engine.
//!
//! Takes one delivery event — a grade posted, a fee charged, a notice
//! published — and pushes it through three independent channels: a durable
//! log row, a real-time push to live gateway sessions, and a best-effort
//! email. The log write is the channel whose failure matters; push and
//! email degrade to fire-and-forget.

pub mod audience;
pub mod directory;
pub mod email;
pub mod engine;
pub mod event;

pub use directory::{DbDirectory, EmailPreference, RecipientDirectory};
pub use email::{EmailMessage, Mailer};
pub use engine::{DispatchError, DispatchReport, Engine};
pub use event::{DeliveryEvent, EmailPayload, Target};
