//! fundproof core - Domain models, storage contract and shared types
//!
//! This crate defines the abstractions shared by the verification pipeline:
//! - Document and campaign models with their verification states
//! - Structured verification details and extracted data
//! - The campaign aggregation rule
//! - Common error types
//! - Configuration management
//! - Storage backends (PostgreSQL, in-memory)

pub mod config;
pub mod memory;
pub mod postgres;
pub mod store;

pub use config::{
    AppConfig, ConfigError, DatabaseConfig, LoggingConfig, NotifyConfig, OcrConfig, WorkerConfig,
};
pub use memory::InMemoryStore;
pub use postgres::PgVerificationStore;
pub use store::VerificationStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for fundproof operations
#[derive(Error, Debug)]
pub enum FundproofError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Another document already carries this text hash
    #[error("Fingerprint already taken: {0}")]
    DuplicateFingerprint(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FundproofError>;

// ============================================================================
// Enumerations
// ============================================================================

/// Document category the uploader claims, or the classifier predicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Identity,
    Income,
    Supporting,
}

impl DocumentType {
    pub const ALL: [DocumentType; 3] = [Self::Identity, Self::Income, Self::Supporting];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Income => "income",
            Self::Supporting => "supporting",
        }
    }

    /// Human-readable label used in notifications
    pub fn label(&self) -> &'static str {
        match self {
            Self::Identity => "Identity document",
            Self::Income => "Proof of income",
            Self::Supporting => "Supporting document",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = FundproofError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "identity" => Ok(Self::Identity),
            "income" => Ok(Self::Income),
            "supporting" => Ok(Self::Supporting),
            other => Err(FundproofError::ValidationError(format!(
                "unknown document type: {other}"
            ))),
        }
    }
}

/// Campaign category (fixed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignCategory {
    Medicine,
    Emergency,
    Charity,
    Education,
    Animals,
    Ecology,
    Sports,
    General,
}

impl CampaignCategory {
    pub const ALL: [CampaignCategory; 8] = [
        Self::Medicine,
        Self::Emergency,
        Self::Charity,
        Self::Education,
        Self::Animals,
        Self::Ecology,
        Self::Sports,
        Self::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Medicine => "medicine",
            Self::Emergency => "emergency",
            Self::Charity => "charity",
            Self::Education => "education",
            Self::Animals => "animals",
            Self::Ecology => "ecology",
            Self::Sports => "sports",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for CampaignCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CampaignCategory {
    type Err = FundproofError;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == needle)
            .ok_or_else(|| FundproofError::ValidationError(format!("unknown category: {s}")))
    }
}

/// Verification state of a document or a campaign
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    /// Awaiting processing
    #[default]
    Pending,
    /// Passed automatic verification
    Approved,
    /// Failed automatic verification
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VerificationStatus {
    type Err = FundproofError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(FundproofError::ValidationError(format!(
                "unknown verification status: {other}"
            ))),
        }
    }
}

/// Campaign lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    #[default]
    Pending,
    Active,
    Successful,
    Expired,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Successful => "successful",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = FundproofError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "successful" => Ok(Self::Successful),
            "expired" => Ok(Self::Expired),
            other => Err(FundproofError::ValidationError(format!(
                "unknown campaign status: {other}"
            ))),
        }
    }
}

/// Why a document was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// OCR produced no text
    Unreadable,
    /// Same text was already uploaded in another document
    Duplicate,
    /// Predicted type or required keywords do not match
    ContentMismatch,
    /// Processing failed with an error
    ProcessingError,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unreadable => "unreadable",
            Self::Duplicate => "duplicate",
            Self::ContentMismatch => "content_mismatch",
            Self::ProcessingError => "processing_error",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Extraction Results
// ============================================================================

/// Coarse named-entity tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityTag {
    #[serde(rename = "PER")]
    Person,
    #[serde(rename = "LOC")]
    Location,
    #[serde(rename = "ORG")]
    Organization,
}

impl EntityTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "PER",
            Self::Location => "LOC",
            Self::Organization => "ORG",
        }
    }
}

impl std::fmt::Display for EntityTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named entity found in document text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    /// Surface text as it appears in the document
    pub text: String,

    #[serde(rename = "type")]
    pub tag: EntityTag,

    /// Normalized (lemma) form
    pub normal: String,

    /// Byte offsets into the source text
    pub start: usize,
    pub end: usize,
}

/// Outcome of the keyword validation of a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Combined matches of both checks, type keywords first
    pub matches: Vec<String>,
    pub type_keywords_matched: Vec<String>,
    pub category_keywords_matched: Vec<String>,
    /// Hard errors, any one of them rejects the document
    pub errors: Vec<String>,
    /// Soft warnings, informational only
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Structured detail stored with each verification outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationDetails {
    /// Human-readable summary, always present
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_type: Option<DocumentType>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,

    /// Error text captured when processing failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything the pipeline read from a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedData {
    pub ocr_text: String,
    pub predicted_type: DocumentType,
    /// Classifier keywords that led to `predicted_type`
    #[serde(default)]
    pub classifier_evidence: Vec<String>,
    pub extracted_entities: Vec<ExtractedEntity>,
    pub validation: ValidationResult,
}

// ============================================================================
// Documents and Campaigns
// ============================================================================

/// One uploaded file tied to a campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,

    /// Owning campaign
    pub campaign_id: Uuid,

    /// Type declared by the uploader
    pub document_type: DocumentType,

    /// Path of the stored file
    pub file_path: String,

    pub uploaded_at: DateTime<Utc>,

    /// SHA-256 of the OCR text, set after processing
    pub text_hash: Option<String>,

    pub verified: bool,
    pub verification_status: VerificationStatus,
    pub verification_details: Option<VerificationDetails>,
    pub extracted_data: Option<ExtractedData>,
}

impl Document {
    /// Create a freshly uploaded document (pending, unverified)
    pub fn new(
        campaign_id: Uuid,
        document_type: DocumentType,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            document_type,
            file_path: file_path.into(),
            uploaded_at: Utc::now(),
            text_hash: None,
            verified: false,
            verification_status: VerificationStatus::Pending,
            verification_details: None,
            extracted_data: None,
        }
    }

    /// Overwrite the verification fields with the result of a processing run
    pub fn apply(&mut self, update: &VerificationUpdate) {
        self.verification_status = update.status();
        self.verified = update.verified();
        self.verification_details = Some(update.details.clone());
        self.extracted_data = update.extracted_data.clone();
        self.text_hash = update.text_hash.clone();
    }
}

/// The set of fields written by one processing run.
///
/// Only the `approved` and `rejected` constructors exist, so `verified`
/// always mirrors the status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationUpdate {
    status: VerificationStatus,
    pub details: VerificationDetails,
    pub extracted_data: Option<ExtractedData>,
    pub text_hash: Option<String>,
}

impl VerificationUpdate {
    pub fn approved(
        details: VerificationDetails,
        extracted_data: ExtractedData,
        text_hash: String,
    ) -> Self {
        Self {
            status: VerificationStatus::Approved,
            details,
            extracted_data: Some(extracted_data),
            text_hash: Some(text_hash),
        }
    }

    pub fn rejected(details: VerificationDetails) -> Self {
        Self {
            status: VerificationStatus::Rejected,
            details,
            extracted_data: None,
            text_hash: None,
        }
    }

    pub fn with_extracted_data(mut self, data: ExtractedData) -> Self {
        self.extracted_data = Some(data);
        self
    }

    pub fn with_text_hash(mut self, hash: impl Into<String>) -> Self {
        self.text_hash = Some(hash.into());
        self
    }

    pub fn status(&self) -> VerificationStatus {
        self.status
    }

    pub fn verified(&self) -> bool {
        self.status == VerificationStatus::Approved
    }
}

/// Funding request that owns uploaded documents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub category: CampaignCategory,
    pub verification_status: VerificationStatus,
    pub status: CampaignStatus,

    /// Goal amount in minor currency units
    pub goal_amount: i64,

    /// Sum of completed donations in minor currency units
    pub total_donated: i64,

    pub expires_at: Option<DateTime<Utc>>,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(author_id: Uuid, title: impl Into<String>, category: CampaignCategory) -> Self {
        Self {
            id: Uuid::new_v4(),
            author_id,
            title: title.into(),
            category,
            verification_status: VerificationStatus::Pending,
            status: CampaignStatus::Pending,
            goal_amount: 0,
            total_donated: 0,
            expires_at: None,
            is_archived: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_goal(mut self, goal_amount: i64) -> Self {
        self.goal_amount = goal_amount;
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn state(&self) -> CampaignState {
        CampaignState {
            verification_status: self.verification_status,
            status: self.status,
        }
    }
}

/// The two campaign fields derived from its documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignState {
    pub verification_status: VerificationStatus,
    pub status: CampaignStatus,
}

impl CampaignState {
    /// Derive campaign state from the statuses of all its documents.
    ///
    /// Depends only on the multiset of statuses. Any rejection wins; the
    /// campaign goes live only when there is at least one document and
    /// every document is approved.
    pub fn aggregate<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = VerificationStatus>,
    {
        let mut any = false;
        let mut all_approved = true;

        for status in statuses {
            any = true;
            match status {
                VerificationStatus::Rejected => {
                    return Self {
                        verification_status: VerificationStatus::Rejected,
                        status: CampaignStatus::Pending,
                    };
                }
                VerificationStatus::Pending => all_approved = false,
                VerificationStatus::Approved => {}
            }
        }

        if any && all_approved {
            Self {
                verification_status: VerificationStatus::Approved,
                status: CampaignStatus::Active,
            }
        } else {
            Self {
                verification_status: VerificationStatus::Pending,
                status: CampaignStatus::Pending,
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use VerificationStatus::*;

    #[test]
    fn test_document_starts_pending() {
        let doc = Document::new(Uuid::new_v4(), DocumentType::Identity, "/media/id.jpg");
        assert_eq!(doc.verification_status, Pending);
        assert!(!doc.verified);
        assert!(doc.text_hash.is_none());
    }

    #[test]
    fn test_update_keeps_verified_in_sync() {
        let mut doc = Document::new(Uuid::new_v4(), DocumentType::Income, "/media/a.pdf");

        let rejected = VerificationUpdate::rejected(VerificationDetails {
            message: "unreadable".into(),
            reason: Some(RejectionReason::Unreadable),
            ..Default::default()
        });
        doc.apply(&rejected);
        assert_eq!(doc.verification_status, Rejected);
        assert!(!doc.verified);

        let data = ExtractedData {
            ocr_text: "справка о доходах".into(),
            predicted_type: DocumentType::Income,
            classifier_evidence: vec!["доход".into()],
            extracted_entities: vec![],
            validation: ValidationResult::default(),
        };
        let approved = VerificationUpdate::approved(
            VerificationDetails::default(),
            data,
            "abc".to_string(),
        );
        doc.apply(&approved);
        assert_eq!(doc.verification_status, Approved);
        assert!(doc.verified);
        assert_eq!(doc.text_hash.as_deref(), Some("abc"));
    }

    #[test]
    fn test_reprocessing_overwrites_details() {
        let mut doc = Document::new(Uuid::new_v4(), DocumentType::Identity, "/media/id.png");
        doc.apply(&VerificationUpdate::rejected(VerificationDetails {
            message: "first".into(),
            ..Default::default()
        }));
        doc.apply(&VerificationUpdate::rejected(VerificationDetails {
            message: "second".into(),
            ..Default::default()
        }));
        assert_eq!(doc.verification_details.unwrap().message, "second");
    }

    #[test]
    fn test_reprocessing_clears_stale_hash() {
        let mut doc = Document::new(Uuid::new_v4(), DocumentType::Income, "/media/b.pdf");
        let hashed =
            VerificationUpdate::rejected(VerificationDetails::default()).with_text_hash("h1");
        doc.apply(&hashed);
        assert_eq!(doc.text_hash.as_deref(), Some("h1"));

        doc.apply(&VerificationUpdate::rejected(VerificationDetails {
            reason: Some(RejectionReason::Unreadable),
            ..Default::default()
        }));
        assert!(doc.text_hash.is_none());
    }

    #[test]
    fn test_aggregate_rules() {
        let rejected = CampaignState::aggregate([Approved, Rejected, Pending]);
        assert_eq!(rejected.verification_status, Rejected);
        assert_eq!(rejected.status, CampaignStatus::Pending);

        let approved = CampaignState::aggregate([Approved, Approved]);
        assert_eq!(approved.verification_status, Approved);
        assert_eq!(approved.status, CampaignStatus::Active);

        let mixed = CampaignState::aggregate([Approved, Pending]);
        assert_eq!(mixed.verification_status, Pending);
        assert_eq!(mixed.status, CampaignStatus::Pending);
    }

    #[test]
    fn test_aggregate_empty_stays_pending() {
        let state = CampaignState::aggregate(std::iter::empty());
        assert_eq!(state.verification_status, Pending);
        assert_eq!(state.status, CampaignStatus::Pending);
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("Identity".parse::<DocumentType>().unwrap(), DocumentType::Identity);
        assert_eq!(
            "ecology".parse::<CampaignCategory>().unwrap(),
            CampaignCategory::Ecology
        );
        assert!("passport".parse::<DocumentType>().is_err());
        assert!("space".parse::<CampaignCategory>().is_err());
        assert_eq!("rejected".parse::<VerificationStatus>().unwrap(), Rejected);
    }

    #[test]
    fn test_details_serialization() {
        let details = VerificationDetails {
            message: "Document already uploaded".into(),
            reason: Some(RejectionReason::Duplicate),
            ..Default::default()
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["reason"], "duplicate");
        assert!(json.get("errors").is_none());

        let entity = ExtractedEntity {
            text: "Алматы".into(),
            tag: EntityTag::Location,
            normal: "Алматы".into(),
            start: 0,
            end: 12,
        };
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["type"], "LOC");
    }
}
