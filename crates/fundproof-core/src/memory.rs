//! In-memory store for tests and local dry runs

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::store::VerificationStore;
use crate::{
    Campaign, CampaignState, CampaignStatus, Document, FundproofError, Result, VerificationUpdate,
};

#[derive(Debug, Default)]
struct State {
    documents: HashMap<Uuid, Document>,
    campaigns: HashMap<Uuid, Campaign>,
}

/// Store keeping everything behind one mutex.
///
/// A single lock makes every operation, including the campaign
/// recomputation, serialized.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all stored documents
    pub async fn documents(&self) -> Vec<Document> {
        let state = self.state.lock().await;
        let mut docs: Vec<Document> = state.documents.values().cloned().collect();
        docs.sort_by_key(|d| d.uploaded_at);
        docs
    }

    /// Apply a change to a stored campaign (donations, expiry edits)
    pub async fn update_campaign<F>(&self, campaign_id: Uuid, f: F) -> Result<()>
    where
        F: FnOnce(&mut Campaign),
    {
        let mut state = self.state.lock().await;
        let campaign = state
            .campaigns
            .get_mut(&campaign_id)
            .ok_or_else(|| FundproofError::NotFound(format!("campaign {campaign_id}")))?;
        f(campaign);
        Ok(())
    }
}

#[async_trait]
impl VerificationStore for InMemoryStore {
    async fn insert_document(&self, doc: &Document) -> Result<Uuid> {
        let mut state = self.state.lock().await;
        if !state.campaigns.contains_key(&doc.campaign_id) {
            return Err(FundproofError::NotFound(format!(
                "campaign {}",
                doc.campaign_id
            )));
        }
        state.documents.insert(doc.id, doc.clone());
        Ok(doc.id)
    }

    async fn insert_campaign(&self, campaign: &Campaign) -> Result<Uuid> {
        let mut state = self.state.lock().await;
        state.campaigns.insert(campaign.id, campaign.clone());
        Ok(campaign.id)
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.state.lock().await.documents.get(&id).cloned())
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>> {
        Ok(self.state.lock().await.campaigns.get(&id).cloned())
    }

    async fn list_campaign_documents(&self, campaign_id: Uuid) -> Result<Vec<Document>> {
        let state = self.state.lock().await;
        let mut docs: Vec<Document> = state
            .documents
            .values()
            .filter(|d| d.campaign_id == campaign_id)
            .cloned()
            .collect();
        docs.sort_by_key(|d| d.uploaded_at);
        Ok(docs)
    }

    async fn fingerprint_taken(&self, text_hash: &str, exclude: Uuid) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .documents
            .values()
            .any(|d| d.id != exclude && d.text_hash.as_deref() == Some(text_hash)))
    }

    async fn save_verification(
        &self,
        document_id: Uuid,
        update: &VerificationUpdate,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(hash) = update.text_hash.as_deref() {
            let taken = state
                .documents
                .values()
                .any(|d| d.id != document_id && d.text_hash.as_deref() == Some(hash));
            if taken {
                return Err(FundproofError::DuplicateFingerprint(hash.to_string()));
            }
        }

        let doc = state
            .documents
            .get_mut(&document_id)
            .ok_or_else(|| FundproofError::NotFound(format!("document {document_id}")))?;
        doc.apply(update);
        Ok(())
    }

    async fn recompute_campaign_state(&self, campaign_id: Uuid) -> Result<CampaignState> {
        let mut state = self.state.lock().await;

        let statuses: Vec<_> = state
            .documents
            .values()
            .filter(|d| d.campaign_id == campaign_id)
            .map(|d| d.verification_status)
            .collect();
        let next = CampaignState::aggregate(statuses);

        let campaign = state
            .campaigns
            .get_mut(&campaign_id)
            .ok_or_else(|| FundproofError::NotFound(format!("campaign {campaign_id}")))?;
        campaign.verification_status = next.verification_status;
        campaign.status = next.status;

        Ok(next)
    }

    async fn list_campaigns_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        let state = self.state.lock().await;
        Ok(state
            .campaigns
            .values()
            .filter(|c| c.status == status)
            .cloned()
            .collect())
    }

    async fn set_campaign_lifecycle(
        &self,
        campaign_id: Uuid,
        from: CampaignStatus,
        to: CampaignStatus,
        archived: bool,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        let campaign = state
            .campaigns
            .get_mut(&campaign_id)
            .ok_or_else(|| FundproofError::NotFound(format!("campaign {campaign_id}")))?;
        if campaign.status != from {
            return Ok(false);
        }
        campaign.status = to;
        campaign.is_archived = archived;
        Ok(true)
    }
}
