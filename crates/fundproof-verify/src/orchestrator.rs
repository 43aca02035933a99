//! End-to-end verification of a single document

use std::path::PathBuf;
use std::sync::Arc;

use fundproof_core::{
    Campaign, Document, FundproofError, RejectionReason, VerificationStore, VerificationUpdate,
};
use fundproof_extractor::EntityExtractor;
use fundproof_ocr::{DocumentTextSource, OcrError};
use tracing::Instrument;
use uuid::Uuid;

use crate::aggregator::CampaignStatusAggregator;
use crate::decision::{early_rejection, outcome_of, DecisionEngine};
use crate::fingerprint::{fingerprint, DuplicateDetector};
use crate::notify::{Notification, Notifier};
use crate::{JobError, Result, VerificationOutcome};

/// Why reading a document produced no text
enum ReadFailure {
    Ocr(OcrError),
    Panicked(String),
}

/// Runs OCR, deduplication and the content decision for one document,
/// persists the result, updates the campaign and notifies its author.
///
/// Shared read-only between workers; every component is built once.
pub struct VerificationOrchestrator {
    store: Arc<dyn VerificationStore>,
    text_source: Arc<dyn DocumentTextSource>,
    engine: DecisionEngine,
    duplicates: DuplicateDetector,
    aggregator: CampaignStatusAggregator,
    notifier: Arc<dyn Notifier>,
    site_url: String,
    max_attempts: u32,
}

impl VerificationOrchestrator {
    pub fn new(
        store: Arc<dyn VerificationStore>,
        text_source: Arc<dyn DocumentTextSource>,
        extractor: Arc<dyn EntityExtractor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            duplicates: DuplicateDetector::new(store.clone()),
            aggregator: CampaignStatusAggregator::new(store.clone()),
            store,
            text_source,
            engine: DecisionEngine::new(extractor),
            notifier,
            site_url: String::new(),
            max_attempts: 3,
        }
    }

    /// Replace the default classifier/validator setup
    pub fn with_engine(mut self, engine: DecisionEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Base URL for campaign links in notifications
    pub fn with_site_url(mut self, site_url: impl Into<String>) -> Self {
        self.site_url = site_url.into();
        self
    }

    /// Attempts before a transient OCR failure becomes a rejection
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn aggregator(&self) -> &CampaignStatusAggregator {
        &self.aggregator
    }

    /// Verify one document. `attempt` starts at 1.
    ///
    /// Returns `JobError::Retry` only for transient OCR failures before the
    /// final attempt, and `JobError::Store` for storage failures before the
    /// final attempt. On the final attempt a storage failure is recorded as
    /// a processing-error rejection; an error is returned only if even that
    /// write fails.
    pub async fn process(&self, document_id: Uuid, attempt: u32) -> Result<VerificationOutcome> {
        let span = tracing::info_span!("verify", %document_id, attempt);
        async {
            match self.run(document_id, attempt).await {
                Err(JobError::Store(e)) if attempt >= self.max_attempts => {
                    self.record_failure(document_id, e).await
                }
                other => other,
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, document_id: Uuid, attempt: u32) -> Result<VerificationOutcome> {
        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or(JobError::DocumentNotFound(document_id))?;
        let Some(campaign) = self.store.get_campaign(document.campaign_id).await? else {
            let error = format!("campaign {} not found", document.campaign_id);
            tracing::warn!(%error, "document has no campaign");
            let update = rejection(RejectionReason::ProcessingError, Some(error));
            self.store.save_verification(document_id, &update).await?;
            return Ok(outcome_of(update.status(), &update.details));
        };

        let update = self.evaluate(&document, &campaign, attempt).await?;
        let update = self.save(document_id, update).await?;

        let outcome = outcome_of(update.status(), &update.details);
        match outcome {
            VerificationOutcome::Approved => tracing::info!(%outcome, "document verified"),
            VerificationOutcome::Rejected { .. } => tracing::warn!(
                %outcome,
                message = %update.details.message,
                "document rejected"
            ),
        }

        if let Err(e) = self.aggregator.recompute(campaign.id).await {
            if attempt < self.max_attempts {
                return Err(e.into());
            }
            tracing::error!(error = %e, "campaign recompute failed on final attempt");
        }
        self.send_notification(&campaign, &document, &update).await;

        Ok(outcome)
    }

    /// Persist the update. A fingerprint claimed by another document since
    /// the duplicate check turns the update into a duplicate rejection.
    async fn save(
        &self,
        document_id: Uuid,
        update: VerificationUpdate,
    ) -> Result<VerificationUpdate> {
        match self.store.save_verification(document_id, &update).await {
            Ok(()) => Ok(update),
            Err(FundproofError::DuplicateFingerprint(_)) => {
                tracing::debug!("fingerprint claimed concurrently");
                let duplicate = rejection(RejectionReason::Duplicate, None);
                self.store.save_verification(document_id, &duplicate).await?;
                Ok(duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Final-attempt fallback after a storage failure: reject, roll up and
    /// notify as far as the store still allows.
    async fn record_failure(
        &self,
        document_id: Uuid,
        error: FundproofError,
    ) -> Result<VerificationOutcome> {
        tracing::error!(error = %error, "storage failed on final attempt");
        let update = rejection(RejectionReason::ProcessingError, Some(error.to_string()));
        self.store.save_verification(document_id, &update).await?;

        if let Ok(Some(document)) = self.store.get_document(document_id).await {
            if let Err(e) = self.aggregator.recompute(document.campaign_id).await {
                tracing::warn!(error = %e, "campaign recompute failed");
            }
            if let Ok(Some(campaign)) = self.store.get_campaign(document.campaign_id).await {
                self.send_notification(&campaign, &document, &update).await;
            }
        }

        Ok(outcome_of(update.status(), &update.details))
    }

    /// Steps up to the persisted update. Only a retry escapes as an error.
    async fn evaluate(
        &self,
        document: &Document,
        campaign: &Campaign,
        attempt: u32,
    ) -> Result<VerificationUpdate> {
        let text = match self.read_text(&document.file_path).await {
            Ok(text) => text,
            Err(ReadFailure::Ocr(e)) if e.is_transient() && attempt < self.max_attempts => {
                tracing::warn!(error = %e, "transient OCR failure");
                return Err(JobError::Retry { attempt, source: e });
            }
            Err(ReadFailure::Ocr(e)) => {
                return Ok(rejection(RejectionReason::Unreadable, Some(e.to_string())));
            }
            Err(ReadFailure::Panicked(msg)) => {
                return Ok(rejection(RejectionReason::ProcessingError, Some(msg)));
            }
        };

        let Some(hash) = fingerprint(&text) else {
            return Ok(rejection(RejectionReason::Unreadable, None));
        };

        match self.duplicates.is_duplicate(&hash, document.id).await {
            Ok(false) => {}
            Ok(true) => return Ok(rejection(RejectionReason::Duplicate, None)),
            Err(e) => return Ok(rejection(RejectionReason::ProcessingError, Some(e.to_string()))),
        }

        match self
            .engine
            .decide(&text, document.document_type, campaign.category)
        {
            Ok(decision) => Ok(decision.into_update(hash)),
            Err(e) => Ok(rejection(RejectionReason::ProcessingError, Some(e.to_string()))
                .with_text_hash(hash)),
        }
    }

    /// OCR on the blocking pool; a panic there is reported, not propagated
    async fn read_text(&self, file_path: &str) -> std::result::Result<String, ReadFailure> {
        let source = Arc::clone(&self.text_source);
        let path = PathBuf::from(file_path);

        match tokio::task::spawn_blocking(move || source.read_text(&path)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(ReadFailure::Ocr(e)),
            Err(join_error) => Err(ReadFailure::Panicked(panic_message(join_error))),
        }
    }

    async fn send_notification(
        &self,
        campaign: &Campaign,
        document: &Document,
        update: &VerificationUpdate,
    ) {
        let notification = Notification::for_decision(
            campaign,
            document.document_type,
            update.status(),
            &update.details,
            &self.site_url,
        );
        if let Err(e) = self.notifier.notify(&notification).await {
            tracing::warn!(recipient = %notification.recipient, error = %e, "notification failed");
        }
    }
}

fn rejection(reason: RejectionReason, error: Option<String>) -> VerificationUpdate {
    VerificationUpdate::rejected(early_rejection(reason, error))
}

fn panic_message(error: tokio::task::JoinError) -> String {
    let Ok(payload) = error.try_into_panic() else {
        return "OCR task was cancelled".to_string();
    };
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("OCR panicked: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyError;
    use async_trait::async_trait;
    use fundproof_core::{CampaignCategory, DocumentType, InMemoryStore, VerificationStatus};
    use fundproof_extractor::RuleBasedNer;
    use std::path::Path;

    struct FixedText(&'static str);

    impl DocumentTextSource for FixedText {
        fn read_text(&self, _: &Path) -> fundproof_ocr::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Panicking;

    impl DocumentTextSource for Panicking {
        fn read_text(&self, _: &Path) -> fundproof_ocr::Result<String> {
            panic!("tesseract segfault")
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _: &Notification) -> std::result::Result<(), NotifyError> {
            Err(NotifyError::Rejected {
                status: 503,
                body: "unavailable".into(),
            })
        }
    }

    async fn setup(
        source: Arc<dyn DocumentTextSource>,
        notifier: Arc<dyn Notifier>,
    ) -> (Arc<InMemoryStore>, VerificationOrchestrator, Document) {
        let store = Arc::new(InMemoryStore::new());
        let campaign = Campaign::new(Uuid::new_v4(), "Сбор", CampaignCategory::General);
        store.insert_campaign(&campaign).await.unwrap();
        let doc = Document::new(campaign.id, DocumentType::Identity, "/uploads/id.png");
        store.insert_document(&doc).await.unwrap();

        let orchestrator = VerificationOrchestrator::new(
            store.clone(),
            source,
            Arc::new(RuleBasedNer::new()),
            notifier,
        );
        (store, orchestrator, doc)
    }

    #[tokio::test]
    async fn test_panic_becomes_processing_error() {
        let (store, orchestrator, doc) =
            setup(Arc::new(Panicking), Arc::new(crate::TracingNotifier)).await;

        let outcome = orchestrator.process(doc.id, 1).await.unwrap();
        assert_eq!(outcome.reason(), Some(RejectionReason::ProcessingError));

        let stored = store.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(stored.verification_status, VerificationStatus::Rejected);
        let error = stored.verification_details.unwrap().error.unwrap();
        assert!(error.contains("tesseract segfault"));
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_decision() {
        let (store, orchestrator, doc) = setup(
            Arc::new(FixedText("Паспорт гражданина")),
            Arc::new(FailingNotifier),
        )
        .await;

        let outcome = orchestrator.process(doc.id, 1).await.unwrap();
        assert!(outcome.is_approved());

        let stored = store.get_document(doc.id).await.unwrap().unwrap();
        assert!(stored.verified);
        assert!(stored.text_hash.is_some());
    }

    #[tokio::test]
    async fn test_missing_document() {
        let (_, orchestrator, _) =
            setup(Arc::new(FixedText("")), Arc::new(crate::TracingNotifier)).await;
        let err = orchestrator.process(Uuid::new_v4(), 1).await.unwrap_err();
        assert!(matches!(err, JobError::DocumentNotFound(_)));
    }

    #[test]
    fn test_max_attempts_floor() {
        let store = Arc::new(InMemoryStore::new());
        let orchestrator = VerificationOrchestrator::new(
            store,
            Arc::new(FixedText("")),
            Arc::new(RuleBasedNer::new()),
            Arc::new(crate::TracingNotifier),
        )
        .with_max_attempts(0);
        assert_eq!(orchestrator.max_attempts(), 1);
    }
}
