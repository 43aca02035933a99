//! Storage contract used by the verification pipeline

use async_trait::async_trait;
use uuid::Uuid;

use crate::{Campaign, CampaignState, CampaignStatus, Document, Result, VerificationUpdate};

/// Trait for document and campaign persistence
#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Store a newly uploaded document
    async fn insert_document(&self, doc: &Document) -> Result<Uuid>;

    /// Store a campaign
    async fn insert_campaign(&self, campaign: &Campaign) -> Result<Uuid>;

    /// Get document by ID
    async fn get_document(&self, id: Uuid) -> Result<Option<Document>>;

    /// Get campaign by ID
    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>>;

    /// All documents of a campaign, oldest first
    async fn list_campaign_documents(&self, campaign_id: Uuid) -> Result<Vec<Document>>;

    /// Whether any document other than `exclude` carries this text hash.
    ///
    /// The lookup is global across campaigns and authors.
    async fn fingerprint_taken(&self, text_hash: &str, exclude: Uuid) -> Result<bool>;

    /// Write the verification fields of one document in a single atomic step.
    ///
    /// All five fields are overwritten, `text_hash` included when the update
    /// carries none. Fails with `FundproofError::DuplicateFingerprint` and
    /// writes nothing if another document already holds the update's hash;
    /// the check and the write are one unit.
    async fn save_verification(&self, document_id: Uuid, update: &VerificationUpdate)
        -> Result<()>;

    /// Recompute and store the campaign state from its documents.
    ///
    /// Implementations serialize concurrent calls for the same campaign so
    /// that the read of all document statuses and the campaign write happen
    /// as one unit.
    async fn recompute_campaign_state(&self, campaign_id: Uuid) -> Result<CampaignState>;

    /// Campaigns currently in the given lifecycle status
    async fn list_campaigns_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>>;

    /// Move a campaign from `from` to `to` and set its archive flag.
    ///
    /// The write only happens if the campaign is still in `from`; returns
    /// whether it did.
    async fn set_campaign_lifecycle(
        &self,
        campaign_id: Uuid,
        from: CampaignStatus,
        to: CampaignStatus,
        archived: bool,
    ) -> Result<bool>;
}
