//! fundproof Extractor - named entity recognition
//!
//! Tags persons, locations and organizations in OCR text and attaches a
//! normalized form to each. The result is informational: it is stored
//! with the verification record but never decides approval.

use fundproof_core::{ExtractedEntity, Result};

pub mod lemma;
pub mod ner;

pub use lemma::Lemmatizer;
pub use ner::RuleBasedNer;

/// Trait for entity extractors
pub trait EntityExtractor: Send + Sync {
    /// Entities in order of appearance, non-overlapping
    fn extract(&self, text: &str) -> Result<Vec<ExtractedEntity>>;
}
