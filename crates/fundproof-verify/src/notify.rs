//! Owner notifications about verification outcomes
//!
//! Delivery is best effort: a failed notification is logged and never
//! undoes a persisted decision.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fundproof_core::{
    Campaign, DocumentType, NotifyConfig, RejectionReason, VerificationDetails, VerificationStatus,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Webhook responded with {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Message for the campaign author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: Uuid,
    /// Short headline, e.g. "Document approved"
    pub verb: String,
    /// What the notification is about: document label and campaign title
    pub target: String,
    /// Link to the campaign page
    pub url: String,
    /// Body with the predicted type and matched keywords or errors
    pub message: String,
}

impl Notification {
    /// Build the notification for a stored decision
    pub fn for_decision(
        campaign: &Campaign,
        document_type: DocumentType,
        status: VerificationStatus,
        details: &VerificationDetails,
        site_url: &str,
    ) -> Self {
        let label = document_type.label();
        let predicted = details
            .predicted_type
            .map(|t| t.as_str())
            .unwrap_or("unknown");

        let (verb, message) = match (status, details.reason) {
            (VerificationStatus::Approved, _) => (
                "Document approved",
                format!(
                    "Your document \"{label}\" has been verified.\nDetected type: {predicted}\nMatched keywords: {}",
                    details.matches.join(", ")
                ),
            ),
            (_, Some(RejectionReason::ProcessingError)) => (
                "Document verification failed",
                format!(
                    "An error occurred while verifying your document \"{label}\":\n{}",
                    details.error.as_deref().unwrap_or(&details.message)
                ),
            ),
            (_, Some(RejectionReason::ContentMismatch)) => (
                "Document rejected",
                format!(
                    "Your document \"{label}\" has been rejected.\nReason: {}\nDetected type: {predicted}\nErrors: {}",
                    details.message,
                    details.errors.join(", ")
                ),
            ),
            _ => (
                "Document rejected",
                format!(
                    "Your document \"{label}\" has been rejected.\nReason: {}",
                    details.message
                ),
            ),
        };

        Self {
            recipient: campaign.author_id,
            verb: verb.to_string(),
            target: format!("{label}: {}", campaign.title),
            url: format!("{}/post/{}", site_url.trim_end_matches('/'), campaign.id),
            message,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log only
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            recipient = %notification.recipient,
            verb = %notification.verb,
            target = %notification.target,
            url = %notification.url,
            "notification"
        );
        Ok(())
    }
}

/// Posts notifications as JSON to an HTTP endpoint
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }
}

/// Webhook notifier when a URL is configured, log-only otherwise
pub fn build_notifier(config: &NotifyConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    Ok(match &config.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(
            url.clone(),
            Duration::from_secs(config.timeout_secs),
        )?),
        None => Arc::new(TracingNotifier),
    })
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status, body });
        }

        tracing::debug!(recipient = %notification.recipient, "notification delivered");
        Ok(())
    }
}
