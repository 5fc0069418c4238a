//! Outbound notification delivery (email gateway, webhook, ...).

pub mod webhook;

use async_trait::async_trait;
use serde::Serialize;
use strum::Display;
use thiserror::Error;

pub use webhook::WebhookNotifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TemplateKind {
    AttendanceRequestSubmitted,
    AttendanceRequestApproved,
    AttendanceRequestRejected,
    ReimbursementCompleted,
    ReimbursementFailed,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("delivery timed out")]
    Timeout,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        address: &str,
        kind: TemplateKind,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError>;
}

/// Writes notifications to the log only. Used when no delivery channel is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        address: &str,
        kind: TemplateKind,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        tracing::info!(address, template = %kind, payload = %payload, "Notification (log only)");
        Ok(())
    }
}
