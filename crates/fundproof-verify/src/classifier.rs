//! Document type prediction by ordered keyword families

use fundproof_core::DocumentType;

const IDENTITY_KEYWORDS: &[&str] = &["паспорт", "удостоверение", "фамилия", "имя", "иин"];

const INCOME_KEYWORDS: &[&str] = &["справка о доходах", "доход", "зарплата", "налоговая декларация"];

const SUPPORTING_KEYWORDS: &[&str] = &[
    "медицина",
    "диагноз",
    "обучение",
    "экология",
    "спорт",
    "чрезвычайная",
    "приют",
    "помощь",
    "документ",
    "финансирование",
    "участие",
    "сертификат",
    "мотивационное письмо",
    "проект",
    "пожар",
    "болезнь",
];

/// Predicted type plus the keywords that led to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub predicted: DocumentType,
    /// Empty when no family matched and the fallback was used
    pub evidence: Vec<String>,
}

/// Keyword family classifier.
///
/// Families are checked in order and the first one with any keyword in
/// the text wins. Text that matches nothing is classified as supporting.
#[derive(Debug, Clone)]
pub struct DocumentClassifier {
    families: Vec<(DocumentType, Vec<String>)>,
}

impl DocumentClassifier {
    pub fn new() -> Self {
        let family = |words: &[&str]| words.iter().map(|w| w.to_string()).collect();
        Self {
            families: vec![
                (DocumentType::Identity, family(IDENTITY_KEYWORDS)),
                (DocumentType::Income, family(INCOME_KEYWORDS)),
                (DocumentType::Supporting, family(SUPPORTING_KEYWORDS)),
            ],
        }
    }

    pub fn classify(&self, text: &str) -> Classification {
        let text = text.to_lowercase();

        for (doc_type, keywords) in &self.families {
            let evidence: Vec<String> = keywords
                .iter()
                .filter(|k| text.contains(k.as_str()))
                .cloned()
                .collect();
            if !evidence.is_empty() {
                return Classification {
                    predicted: *doc_type,
                    evidence,
                };
            }
        }

        Classification {
            predicted: DocumentType::Supporting,
            evidence: Vec::new(),
        }
    }

    pub fn predict(&self, text: &str) -> DocumentType {
        self.classify(text).predicted
    }

    /// Keywords of one family, in check order
    pub fn keywords(&self, doc_type: DocumentType) -> &[String] {
        self.families
            .iter()
            .find(|(t, _)| *t == doc_type)
            .map(|(_, k)| k.as_slice())
            .unwrap_or(&[])
    }
}

impl Default for DocumentClassifier {
    fn default() -> Self {
        Self::new()
    }
}
