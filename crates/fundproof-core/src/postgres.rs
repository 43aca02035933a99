//! PostgreSQL verification store
//!
//! Documents, campaigns and the global fingerprint index live in
//! PostgreSQL (see `migrations/`). Campaign recomputation takes a row
//! lock on the campaign so sibling documents finishing concurrently
//! converge to the same state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::store::VerificationStore;
use crate::{
    Campaign, CampaignState, CampaignStatus, Document, ExtractedData, FundproofError, Result,
    VerificationDetails, VerificationStatus, VerificationUpdate,
};

/// PostgreSQL-backed store
pub struct PgVerificationStore {
    pool: PgPool,
}

impl PgVerificationStore {
    /// Create a new store connection
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| FundproofError::DatabaseError(format!("PostgreSQL connection failed: {e}")))?;

        tracing::info!(max_connections, "connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Document row from database
#[derive(Debug, FromRow)]
struct DocumentRow {
    id: Uuid,
    campaign_id: Uuid,
    document_type: String,
    file_path: String,
    uploaded_at: DateTime<Utc>,
    text_hash: Option<String>,
    verified: bool,
    verification_status: String,
    verification_details: Option<Json<VerificationDetails>>,
    extracted_data: Option<Json<ExtractedData>>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = FundproofError;

    fn try_from(row: DocumentRow) -> Result<Self> {
        Ok(Document {
            id: row.id,
            campaign_id: row.campaign_id,
            document_type: row.document_type.parse()?,
            file_path: row.file_path,
            uploaded_at: row.uploaded_at,
            text_hash: row.text_hash,
            verified: row.verified,
            verification_status: row.verification_status.parse()?,
            verification_details: row.verification_details.map(|j| j.0),
            extracted_data: row.extracted_data.map(|j| j.0),
        })
    }
}

/// Campaign row from database
#[derive(Debug, FromRow)]
struct CampaignRow {
    id: Uuid,
    author_id: Uuid,
    title: String,
    category: String,
    verification_status: String,
    status: String,
    goal_amount: i64,
    total_donated: i64,
    expires_at: Option<DateTime<Utc>>,
    is_archived: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = FundproofError;

    fn try_from(row: CampaignRow) -> Result<Self> {
        Ok(Campaign {
            id: row.id,
            author_id: row.author_id,
            title: row.title,
            category: row.category.parse()?,
            verification_status: row.verification_status.parse()?,
            status: row.status.parse()?,
            goal_amount: row.goal_amount,
            total_donated: row.total_donated,
            expires_at: row.expires_at,
            is_archived: row.is_archived,
            created_at: row.created_at,
        })
    }
}

const DOCUMENT_COLUMNS: &str = r#"
    id, campaign_id, document_type, file_path, uploaded_at, text_hash,
    verified, verification_status, verification_details, extracted_data
"#;

const CAMPAIGN_COLUMNS: &str = r#"
    id, author_id, title, category, verification_status, status,
    goal_amount, total_donated, expires_at, is_archived, created_at
"#;

#[async_trait]
impl VerificationStore for PgVerificationStore {
    async fn insert_document(&self, doc: &Document) -> Result<Uuid> {
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO documents (
                id, campaign_id, document_type, file_path, uploaded_at, text_hash,
                verified, verification_status, verification_details, extracted_data
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(doc.id)
        .bind(doc.campaign_id)
        .bind(doc.document_type.as_str())
        .bind(&doc.file_path)
        .bind(doc.uploaded_at)
        .bind(&doc.text_hash)
        .bind(doc.verified)
        .bind(doc.verification_status.as_str())
        .bind(doc.verification_details.as_ref().map(Json))
        .bind(doc.extracted_data.as_ref().map(Json))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| FundproofError::DatabaseError(format!("Failed to create document: {e}")))?;

        Ok(row.0)
    }

    async fn insert_campaign(&self, campaign: &Campaign) -> Result<Uuid> {
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO campaigns (
                id, author_id, title, category, verification_status, status,
                goal_amount, total_donated, expires_at, is_archived, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(campaign.id)
        .bind(campaign.author_id)
        .bind(&campaign.title)
        .bind(campaign.category.as_str())
        .bind(campaign.verification_status.as_str())
        .bind(campaign.status.as_str())
        .bind(campaign.goal_amount)
        .bind(campaign.total_donated)
        .bind(campaign.expires_at)
        .bind(campaign.is_archived)
        .bind(campaign.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| FundproofError::DatabaseError(format!("Failed to create campaign: {e}")))?;

        Ok(row.0)
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let row: Option<DocumentRow> =
            sqlx::query_as(&format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| FundproofError::DatabaseError(format!("Failed to get document: {e}")))?;

        row.map(Document::try_from).transpose()
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>> {
        let row: Option<CampaignRow> =
            sqlx::query_as(&format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| FundproofError::DatabaseError(format!("Failed to get campaign: {e}")))?;

        row.map(Campaign::try_from).transpose()
    }

    async fn list_campaign_documents(&self, campaign_id: Uuid) -> Result<Vec<Document>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE campaign_id = $1 ORDER BY uploaded_at"
        ))
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FundproofError::DatabaseError(format!("Failed to list documents: {e}")))?;

        rows.into_iter().map(Document::try_from).collect()
    }

    async fn fingerprint_taken(&self, text_hash: &str, exclude: Uuid) -> Result<bool> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM documents WHERE text_hash = $1 AND id <> $2)",
        )
        .bind(text_hash)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| FundproofError::DatabaseError(format!("Fingerprint lookup failed: {e}")))?;

        Ok(row.0)
    }

    async fn save_verification(
        &self,
        document_id: Uuid,
        update: &VerificationUpdate,
    ) -> Result<()> {
        // The unique index on text_hash makes the duplicate check part of the write
        let result = sqlx::query(
            r#"
            UPDATE documents SET
                verified = $2,
                verification_status = $3,
                verification_details = $4,
                extracted_data = $5,
                text_hash = $6
            WHERE id = $1
            "#,
        )
        .bind(document_id)
        .bind(update.verified())
        .bind(update.status().as_str())
        .bind(Json(&update.details))
        .bind(update.extracted_data.as_ref().map(Json))
        .bind(&update.text_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| save_error(e, update))?;

        if result.rows_affected() == 0 {
            return Err(FundproofError::NotFound(format!("document {document_id}")));
        }
        Ok(())
    }

    async fn recompute_campaign_state(&self, campaign_id: Uuid) -> Result<CampaignState> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| FundproofError::DatabaseError(format!("Failed to begin transaction: {e}")))?;

        let locked: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM campaigns WHERE id = $1 FOR UPDATE")
                .bind(campaign_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| FundproofError::DatabaseError(format!("Failed to lock campaign: {e}")))?;

        if locked.is_none() {
            return Err(FundproofError::NotFound(format!("campaign {campaign_id}")));
        }

        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT verification_status FROM documents WHERE campaign_id = $1")
                .bind(campaign_id)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| {
                    FundproofError::DatabaseError(format!("Failed to read document statuses: {e}"))
                })?;

        let statuses = rows
            .into_iter()
            .map(|(s,)| s.parse::<VerificationStatus>())
            .collect::<Result<Vec<_>>>()?;
        let next = CampaignState::aggregate(statuses);

        sqlx::query("UPDATE campaigns SET verification_status = $2, status = $3 WHERE id = $1")
            .bind(campaign_id)
            .bind(next.verification_status.as_str())
            .bind(next.status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| FundproofError::DatabaseError(format!("Failed to update campaign: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| FundproofError::DatabaseError(format!("Failed to commit: {e}")))?;

        tracing::debug!(
            %campaign_id,
            verification_status = next.verification_status.as_str(),
            status = next.status.as_str(),
            "campaign state recomputed"
        );
        Ok(next)
    }

    async fn list_campaigns_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        let rows: Vec<CampaignRow> = sqlx::query_as(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE status = $1 ORDER BY created_at"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FundproofError::DatabaseError(format!("Failed to list campaigns: {e}")))?;

        rows.into_iter().map(Campaign::try_from).collect()
    }

    async fn set_campaign_lifecycle(
        &self,
        campaign_id: Uuid,
        from: CampaignStatus,
        to: CampaignStatus,
        archived: bool,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE campaigns SET status = $3, is_archived = $4 WHERE id = $1 AND status = $2",
        )
        .bind(campaign_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(archived)
        .execute(&self.pool)
        .await
        .map_err(|e| FundproofError::DatabaseError(format!("Failed to update campaign: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}

fn save_error(error: sqlx::Error, update: &VerificationUpdate) -> FundproofError {
    match (&error, update.text_hash.as_deref()) {
        (sqlx::Error::Database(db), Some(hash)) if db.is_unique_violation() => {
            FundproofError::DuplicateFingerprint(hash.to_string())
        }
        _ => FundproofError::DatabaseError(format!("Failed to save verification: {error}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_row_conversion() {
        let row = DocumentRow {
            id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            document_type: "income".into(),
            file_path: "/media/doc.pdf".into(),
            uploaded_at: Utc::now(),
            text_hash: None,
            verified: false,
            verification_status: "pending".into(),
            verification_details: None,
            extracted_data: None,
        };

        let doc = Document::try_from(row).unwrap();
        assert_eq!(doc.document_type, crate::DocumentType::Income);
        assert_eq!(doc.verification_status, VerificationStatus::Pending);
    }

    #[test]
    fn test_campaign_row_rejects_unknown_category() {
        let row = CampaignRow {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            title: "t".into(),
            category: "space".into(),
            verification_status: "pending".into(),
            status: "pending".into(),
            goal_amount: 0,
            total_donated: 0,
            expires_at: None,
            is_archived: false,
            created_at: Utc::now(),
        };

        assert!(Campaign::try_from(row).is_err());
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL instance at DATABASE_URL"]
    async fn test_pg_roundtrip() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let store = PgVerificationStore::new(&url, 2).await.unwrap();
        let campaign = Campaign::new(Uuid::new_v4(), "Shelter", crate::CampaignCategory::Animals);
        store.insert_campaign(&campaign).await.unwrap();

        let state = store.recompute_campaign_state(campaign.id).await.unwrap();
        assert_eq!(state.verification_status, VerificationStatus::Pending);
    }
}
