//! fundproof Verify - document verification pipeline
//!
//! Decides whether an uploaded campaign document is genuine, unique and
//! relevant, then rolls the decision up into the campaign state:
//!
//! ```text
//! file -> OCR -> fingerprint/duplicate check -> classifier + NER + validator
//!      -> persisted decision -> campaign aggregation -> owner notification
//! ```
//!
//! `VerificationOrchestrator` runs one document end to end and always ends
//! with a persisted decision. `VerificationQueue` runs many of them on a
//! worker pool with retries for transient failures.

use fundproof_core::{FundproofError, RejectionReason};
use fundproof_ocr::OcrError;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub mod aggregator;
pub mod classifier;
pub mod decision;
pub mod fingerprint;
pub mod notify;
pub mod orchestrator;
pub mod queue;
pub mod validation;

pub use aggregator::{CampaignStatusAggregator, LifecycleChange};
pub use classifier::{Classification, DocumentClassifier};
pub use decision::{Decision, DecisionEngine};
pub use fingerprint::{fingerprint, DuplicateDetector};
pub use notify::{
    build_notifier, Notification, Notifier, NotifyError, TracingNotifier, WebhookNotifier,
};
pub use orchestrator::VerificationOrchestrator;
pub use queue::{QueueConfig, VerificationJob, VerificationQueue};
pub use validation::ContentValidator;

// ============================================================================
// Errors and outcomes
// ============================================================================

/// Errors surfaced to the job scheduler.
///
/// Everything else that goes wrong while verifying is turned into a
/// persisted rejection instead of an error.
#[derive(Error, Debug)]
pub enum JobError {
    /// Transient OCR failure, the job should be re-run
    #[error("attempt {attempt} hit a transient failure: {source}")]
    Retry {
        attempt: u32,
        #[source]
        source: OcrError,
    },

    #[error("document not found: {0}")]
    DocumentNotFound(Uuid),

    /// The decision could not be persisted or the campaign not recomputed
    #[error("storage error: {0}")]
    Store(#[from] FundproofError),

    #[error("verification queue is closed")]
    QueueClosed,
}

impl JobError {
    /// Whether re-running the job may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retry { .. } | Self::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, JobError>;

/// Terminal result of one processing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Approved,
    Rejected { reason: RejectionReason },
}

impl VerificationOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }

    pub fn reason(&self) -> Option<RejectionReason> {
        match self {
            Self::Approved => None,
            Self::Rejected { reason } => Some(*reason),
        }
    }
}

impl std::fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => f.write_str("approved"),
            Self::Rejected { reason } => write!(f, "rejected ({reason})"),
        }
    }
}
