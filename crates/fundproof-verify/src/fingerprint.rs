//! Content fingerprints and duplicate detection

use std::sync::Arc;

use fundproof_core::{Result, VerificationStore};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// SHA-256 of the UTF-8 text as lowercase hex.
///
/// Blank text has no fingerprint; it is unreadable, never a duplicate.
pub fn fingerprint(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    Some(hex::encode(Sha256::digest(text.as_bytes())))
}

/// Looks fingerprints up across every stored document
#[derive(Clone)]
pub struct DuplicateDetector {
    store: Arc<dyn VerificationStore>,
}

impl DuplicateDetector {
    pub fn new(store: Arc<dyn VerificationStore>) -> Self {
        Self { store }
    }

    /// True when a document other than `document_id` carries `hash`
    pub async fn is_duplicate(&self, hash: &str, document_id: Uuid) -> Result<bool> {
        let taken = self.store.fingerprint_taken(hash, document_id).await?;
        if taken {
            tracing::debug!(%document_id, hash, "fingerprint already on record");
        }
        Ok(taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fundproof_core::{
        Campaign, CampaignCategory, Document, DocumentType, InMemoryStore, VerificationDetails,
        VerificationUpdate,
    };
    use proptest::prelude::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            fingerprint("abc").unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(fingerprint("abc").unwrap().len(), 64);
    }

    #[test]
    fn test_blank_text_has_no_fingerprint() {
        assert_eq!(fingerprint(""), None);
        assert_eq!(fingerprint(" \n\t"), None);
    }

    proptest! {
        #[test]
        fn prop_deterministic(text in "\\PC{1,64}") {
            prop_assert_eq!(fingerprint(&text), fingerprint(&text));
        }

        #[test]
        fn prop_distinct_texts_differ(a in "[а-я]{1,32}", b in "[а-я]{1,32}") {
            prop_assume!(a != b);
            prop_assert_ne!(fingerprint(&a), fingerprint(&b));
        }
    }

    #[tokio::test]
    async fn test_duplicate_across_campaigns() {
        let store = Arc::new(InMemoryStore::new());
        let first = Campaign::new(Uuid::new_v4(), "Лечение", CampaignCategory::Medicine);
        let second = Campaign::new(Uuid::new_v4(), "Приют", CampaignCategory::Animals);
        store.insert_campaign(&first).await.unwrap();
        store.insert_campaign(&second).await.unwrap();

        let original = Document::new(first.id, DocumentType::Income, "a.png");
        let copy = Document::new(second.id, DocumentType::Income, "b.png");
        store.insert_document(&original).await.unwrap();
        store.insert_document(&copy).await.unwrap();

        let hash = fingerprint("Справка о доходах за 2023").unwrap();
        let update =
            VerificationUpdate::rejected(VerificationDetails::default()).with_text_hash(&hash);
        store.save_verification(original.id, &update).await.unwrap();

        let detector = DuplicateDetector::new(store);
        assert!(detector.is_duplicate(&hash, copy.id).await.unwrap());
        assert!(!detector.is_duplicate(&hash, original.id).await.unwrap());
    }
}
