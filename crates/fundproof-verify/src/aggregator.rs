//! Campaign-level roll-up of document decisions and the lifecycle sweep

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fundproof_core::{Campaign, CampaignState, CampaignStatus, Result, VerificationStore};
use serde::Serialize;
use uuid::Uuid;

/// A lifecycle transition applied by the sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleChange {
    pub campaign_id: Uuid,
    pub status: CampaignStatus,
}

/// Where an active campaign should move at `now`, if anywhere.
///
/// Reaching the goal wins over expiry. A goal of 0 counts as "no goal set"
/// rather than as already reached, so such a campaign only closes when it
/// expires instead of being archived as successful on the first sweep.
pub fn lifecycle_transition(campaign: &Campaign, now: DateTime<Utc>) -> Option<CampaignStatus> {
    if campaign.status != CampaignStatus::Active {
        return None;
    }
    if campaign.goal_amount > 0 && campaign.total_donated >= campaign.goal_amount {
        return Some(CampaignStatus::Successful);
    }
    match campaign.expires_at {
        Some(expires_at) if expires_at <= now => Some(CampaignStatus::Expired),
        _ => None,
    }
}

pub struct CampaignStatusAggregator {
    store: Arc<dyn VerificationStore>,
}

impl CampaignStatusAggregator {
    pub fn new(store: Arc<dyn VerificationStore>) -> Self {
        Self { store }
    }

    /// Recompute verification and lifecycle status from all documents of
    /// the campaign. Serialized per campaign by the store.
    pub async fn recompute(&self, campaign_id: Uuid) -> Result<CampaignState> {
        let state = self.store.recompute_campaign_state(campaign_id).await?;
        tracing::info!(
            %campaign_id,
            verification_status = %state.verification_status,
            status = %state.status,
            "campaign state recomputed"
        );
        Ok(state)
    }

    /// Close active campaigns that reached their goal or expired.
    ///
    /// The store only applies a transition if the campaign is still active,
    /// so a campaign moved back to pending by a concurrent recompute is left
    /// alone. A failure on one campaign is logged and does not stop the sweep.
    pub async fn sweep_lifecycle(&self, now: DateTime<Utc>) -> Result<Vec<LifecycleChange>> {
        let active = self
            .store
            .list_campaigns_by_status(CampaignStatus::Active)
            .await?;

        let mut changes = Vec::new();
        for campaign in &active {
            let Some(status) = lifecycle_transition(campaign, now) else {
                continue;
            };

            match self
                .store
                .set_campaign_lifecycle(campaign.id, CampaignStatus::Active, status, true)
                .await
            {
                Ok(false) => {
                    tracing::debug!(campaign_id = %campaign.id, "campaign left active status, skipped");
                }
                Ok(true) => {
                    tracing::info!(campaign_id = %campaign.id, %status, "campaign closed");
                    changes.push(LifecycleChange {
                        campaign_id: campaign.id,
                        status,
                    });
                }
                Err(e) => {
                    tracing::warn!(campaign_id = %campaign.id, error = %e, "lifecycle update failed")
                }
            }
        }

        tracing::debug!(checked = active.len(), closed = changes.len(), "lifecycle sweep done");
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use fundproof_core::{CampaignCategory, Document, InMemoryStore, VerificationUpdate};

    /// Returns the active listing, then lets a sibling rejection move every
    /// listed campaign back to pending before the sweep writes.
    struct RejectAfterListing(Arc<InMemoryStore>);

    #[async_trait]
    impl VerificationStore for RejectAfterListing {
        async fn insert_document(&self, doc: &Document) -> Result<Uuid> {
            self.0.insert_document(doc).await
        }
        async fn insert_campaign(&self, campaign: &Campaign) -> Result<Uuid> {
            self.0.insert_campaign(campaign).await
        }
        async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
            self.0.get_document(id).await
        }
        async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>> {
            self.0.get_campaign(id).await
        }
        async fn list_campaign_documents(&self, campaign_id: Uuid) -> Result<Vec<Document>> {
            self.0.list_campaign_documents(campaign_id).await
        }
        async fn fingerprint_taken(&self, text_hash: &str, exclude: Uuid) -> Result<bool> {
            self.0.fingerprint_taken(text_hash, exclude).await
        }
        async fn save_verification(&self, id: Uuid, update: &VerificationUpdate) -> Result<()> {
            self.0.save_verification(id, update).await
        }
        async fn recompute_campaign_state(&self, campaign_id: Uuid) -> Result<CampaignState> {
            self.0.recompute_campaign_state(campaign_id).await
        }
        async fn list_campaigns_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
            let listed = self.0.list_campaigns_by_status(status).await?;
            for campaign in &listed {
                self.0
                    .update_campaign(campaign.id, |c| c.status = CampaignStatus::Pending)
                    .await?;
            }
            Ok(listed)
        }
        async fn set_campaign_lifecycle(
            &self,
            campaign_id: Uuid,
            from: CampaignStatus,
            to: CampaignStatus,
            archived: bool,
        ) -> Result<bool> {
            self.0.set_campaign_lifecycle(campaign_id, from, to, archived).await
        }
    }

    fn active(goal: i64, donated: i64, expires_at: Option<DateTime<Utc>>) -> Campaign {
        let mut campaign = Campaign::new(Uuid::new_v4(), "Сбор", CampaignCategory::General)
            .with_goal(goal);
        campaign.status = CampaignStatus::Active;
        campaign.total_donated = donated;
        campaign.expires_at = expires_at;
        campaign
    }

    #[test]
    fn test_goal_wins_over_expiry() {
        let now = Utc::now();
        let past = Some(now - Duration::days(1));

        assert_eq!(
            lifecycle_transition(&active(1000, 1000, past), now),
            Some(CampaignStatus::Successful)
        );
        assert_eq!(
            lifecycle_transition(&active(1000, 999, past), now),
            Some(CampaignStatus::Expired)
        );
        assert_eq!(lifecycle_transition(&active(1000, 10, None), now), None);
        assert_eq!(
            lifecycle_transition(&active(1000, 10, Some(now + Duration::hours(1))), now),
            None
        );
    }

    #[test]
    fn test_only_active_campaigns_move() {
        let now = Utc::now();
        let mut campaign = active(100, 500, None);
        campaign.status = CampaignStatus::Pending;
        assert_eq!(lifecycle_transition(&campaign, now), None);
    }

    #[tokio::test]
    async fn test_sweep_archives() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();

        let funded = active(100, 150, None);
        let expired = active(100, 0, Some(now - Duration::minutes(5)));
        let running = active(100, 0, Some(now + Duration::days(3)));
        for c in [&funded, &expired, &running] {
            store.insert_campaign(c).await.unwrap();
        }

        let aggregator = CampaignStatusAggregator::new(store.clone());
        let mut changes = aggregator.sweep_lifecycle(now).await.unwrap();
        changes.sort_by_key(|c| c.status.as_str());

        assert_eq!(changes.len(), 2);
        let funded_now = store.get_campaign(funded.id).await.unwrap().unwrap();
        assert_eq!(funded_now.status, CampaignStatus::Successful);
        assert!(funded_now.is_archived);

        let expired_now = store.get_campaign(expired.id).await.unwrap().unwrap();
        assert_eq!(expired_now.status, CampaignStatus::Expired);
        assert!(expired_now.is_archived);

        let running_now = store.get_campaign(running.id).await.unwrap().unwrap();
        assert_eq!(running_now.status, CampaignStatus::Active);
        assert!(!running_now.is_archived);

        // Closed campaigns are no longer active, a second sweep is a no-op
        assert!(aggregator.sweep_lifecycle(now).await.unwrap().is_empty());
    }

    #[test]
    fn test_zero_goal_never_counts_as_reached() {
        let now = Utc::now();
        assert_eq!(lifecycle_transition(&active(0, 0, None), now), None);
        assert_eq!(
            lifecycle_transition(&active(0, 0, Some(now - Duration::days(1))), now),
            Some(CampaignStatus::Expired)
        );
    }

    #[tokio::test]
    async fn test_sweep_skips_campaign_moved_back_to_pending() {
        let inner = Arc::new(InMemoryStore::new());
        let funded = active(100, 150, None);
        inner.insert_campaign(&funded).await.unwrap();

        let aggregator = CampaignStatusAggregator::new(Arc::new(RejectAfterListing(inner.clone())));
        let changes = aggregator.sweep_lifecycle(Utc::now()).await.unwrap();
        assert!(changes.is_empty());

        let stored = inner.get_campaign(funded.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CampaignStatus::Pending);
        assert!(!stored.is_archived);
    }
}
