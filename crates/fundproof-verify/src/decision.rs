//! The content decision for one document text
//!
//! Pure apart from the entity extractor: the same text, declared type and
//! category always produce the same decision.

use std::sync::Arc;

use fundproof_core::{
    CampaignCategory, DocumentType, ExtractedData, RejectionReason, Result, VerificationDetails,
    VerificationStatus, VerificationUpdate,
};
use fundproof_extractor::EntityExtractor;
use serde::Serialize;

use crate::classifier::DocumentClassifier;
use crate::validation::ContentValidator;
use crate::VerificationOutcome;

pub const APPROVED_MESSAGE: &str = "Document verified successfully";
pub const MISMATCH_MESSAGE: &str = "Document does not meet the requirements";
pub const UNREADABLE_MESSAGE: &str = "No text could be read from the document";
pub const DUPLICATE_MESSAGE: &str = "Document has already been uploaded";
pub const FAILED_MESSAGE: &str = "Document verification failed";

/// Result of classifying and validating one text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub status: VerificationStatus,
    pub details: VerificationDetails,
    pub extracted: ExtractedData,
}

impl Decision {
    pub fn is_approved(&self) -> bool {
        self.status == VerificationStatus::Approved
    }

    pub fn outcome(&self) -> VerificationOutcome {
        outcome_of(self.status, &self.details)
    }

    /// Persistable update carrying the text fingerprint
    pub fn into_update(self, text_hash: String) -> VerificationUpdate {
        if self.is_approved() {
            VerificationUpdate::approved(self.details, self.extracted, text_hash)
        } else {
            VerificationUpdate::rejected(self.details)
                .with_extracted_data(self.extracted)
                .with_text_hash(text_hash)
        }
    }
}

/// Outcome implied by a stored status and its details
pub fn outcome_of(status: VerificationStatus, details: &VerificationDetails) -> VerificationOutcome {
    match status {
        VerificationStatus::Approved => VerificationOutcome::Approved,
        _ => VerificationOutcome::Rejected {
            reason: details.reason.unwrap_or(RejectionReason::ProcessingError),
        },
    }
}

/// Details for a rejection that happened before any content was analysed
pub fn early_rejection(reason: RejectionReason, error: Option<String>) -> VerificationDetails {
    let message = match reason {
        RejectionReason::Unreadable => UNREADABLE_MESSAGE,
        RejectionReason::Duplicate => DUPLICATE_MESSAGE,
        RejectionReason::ContentMismatch => MISMATCH_MESSAGE,
        RejectionReason::ProcessingError => FAILED_MESSAGE,
    };
    VerificationDetails {
        message: message.to_string(),
        reason: Some(reason),
        error,
        ..Default::default()
    }
}

/// Classifier, validator and entity extractor, built once and shared
#[derive(Clone)]
pub struct DecisionEngine {
    classifier: DocumentClassifier,
    validator: ContentValidator,
    extractor: Arc<dyn EntityExtractor>,
}

impl DecisionEngine {
    pub fn new(extractor: Arc<dyn EntityExtractor>) -> Self {
        Self {
            classifier: DocumentClassifier::new(),
            validator: ContentValidator::new(),
            extractor,
        }
    }

    pub fn with_classifier(mut self, classifier: DocumentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_validator(mut self, validator: ContentValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Approve iff the predicted type equals the declared type and the
    /// validator reports no errors
    pub fn decide(
        &self,
        text: &str,
        declared: DocumentType,
        category: CampaignCategory,
    ) -> Result<Decision> {
        let classification = self.classifier.classify(text);
        let entities = self.extractor.extract(text)?;
        let validation = self.validator.validate(declared, category, text);

        let predicted = classification.predicted;
        let type_matches = predicted == declared;
        let approved = type_matches && !validation.has_errors();

        let details = if approved {
            VerificationDetails {
                message: APPROVED_MESSAGE.to_string(),
                predicted_type: Some(predicted),
                matches: validation.matches.clone(),
                ..Default::default()
            }
        } else {
            let mut errors = Vec::new();
            if !type_matches {
                errors.push(format!(
                    "Document looks like '{predicted}' but was uploaded as '{declared}'"
                ));
            }
            errors.extend(validation.errors.iter().cloned());

            VerificationDetails {
                message: MISMATCH_MESSAGE.to_string(),
                reason: Some(RejectionReason::ContentMismatch),
                predicted_type: Some(predicted),
                errors,
                warnings: validation.warnings.clone(),
                ..Default::default()
            }
        };

        tracing::debug!(
            %predicted,
            %declared,
            entities = entities.len(),
            approved,
            "content decision"
        );

        Ok(Decision {
            status: if approved {
                VerificationStatus::Approved
            } else {
                VerificationStatus::Rejected
            },
            details,
            extracted: ExtractedData {
                ocr_text: text.to_string(),
                predicted_type: predicted,
                classifier_evidence: classification.evidence,
                extracted_entities: entities,
                validation,
            },
        })
    }
}
