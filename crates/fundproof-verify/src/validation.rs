//! Keyword validation of document content against its declared type and
//! the campaign category

use std::collections::HashMap;

use fundproof_core::{CampaignCategory, DocumentType, ValidationResult};

fn type_requirements() -> HashMap<DocumentType, Vec<&'static str>> {
    HashMap::from([
        (
            DocumentType::Identity,
            vec!["фамилия", "имя", "дата рождения", "иин", "удостоверение", "паспорт"],
        ),
        (
            DocumentType::Income,
            vec!["доход", "зарплата", "справка о доходах", "налоговая декларация"],
        ),
        (
            DocumentType::Supporting,
            vec!["медицинская справка", "чек", "фактура", "письмо", "подтверждение"],
        ),
    ])
}

fn category_hints() -> HashMap<CampaignCategory, Vec<&'static str>> {
    HashMap::from([
        (
            CampaignCategory::Medicine,
            vec![
                "диагноз",
                "лечение",
                "инвалидность",
                "история болезни",
                "счет на лечение",
                "госпиталь",
                "медицинский центр",
                "финансирование",
            ],
        ),
        (
            CampaignCategory::Education,
            vec![
                "аттестат",
                "диплом",
                "счет учебного заведения",
                "академические достижения",
                "мотивационное письмо",
                "рекомендательное письмо",
                "образование",
                "университет",
            ],
        ),
        (
            CampaignCategory::Ecology,
            vec![
                "экологический проект",
                "оценка воздействия",
                "разрешение",
                "инициатива",
                "окружающая среда",
            ],
        ),
        (
            CampaignCategory::Emergency,
            vec!["чрезвычайная ситуация", "мчс", "пожар", "полиция", "социальное обслуживание"],
        ),
        (
            CampaignCategory::Charity,
            vec![
                "социально уязвимая группа",
                "семейное положение",
                "план использования средств",
            ],
        ),
        (
            CampaignCategory::Animals,
            vec!["приют", "животные", "ветеринар", "защита животных", "опека", "питомец"],
        ),
        (
            CampaignCategory::General,
            vec!["целевое использование", "общественная инициатива", "помощь", "добровольцы"],
        ),
        (
            CampaignCategory::Sports,
            vec![
                "соревнование",
                "спорт",
                "участие",
                "мероприятие",
                "сертификат",
                "достижение",
                "спортсмены",
            ],
        ),
    ])
}

/// Two independent keyword checks over lower-cased text:
/// a missing type keyword is an error, a missing category keyword only a
/// warning.
#[derive(Debug, Clone)]
pub struct ContentValidator {
    requirements: HashMap<DocumentType, Vec<&'static str>>,
    hints: HashMap<CampaignCategory, Vec<&'static str>>,
}

impl ContentValidator {
    pub fn new() -> Self {
        Self {
            requirements: type_requirements(),
            hints: category_hints(),
        }
    }

    pub fn validate(
        &self,
        declared: DocumentType,
        category: CampaignCategory,
        text: &str,
    ) -> ValidationResult {
        let text = text.to_lowercase();
        let found = |keywords: Option<&Vec<&'static str>>| -> Vec<String> {
            keywords
                .map(|k| k.as_slice())
                .unwrap_or_default()
                .iter()
                .filter(|k| text.contains(*k))
                .map(|k| k.to_string())
                .collect()
        };

        let type_found = found(self.requirements.get(&declared));
        let category_found = found(self.hints.get(&category));

        let mut result = ValidationResult::default();

        if type_found.is_empty() {
            result.errors.push(format!(
                "Text does not contain the keywords required for document type '{declared}'"
            ));
        }
        if category_found.is_empty() {
            result.warnings.push(format!(
                "No evidence that the document relates to category '{category}'"
            ));
        }

        result.matches = type_found.iter().chain(&category_found).cloned().collect();
        result.type_keywords_matched = type_found;
        result.category_keywords_matched = category_found;
        result
    }
}

impl Default for ContentValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_with_category_hint() {
        let validator = ContentValidator::new();
        let result = validator.validate(
            DocumentType::Identity,
            CampaignCategory::Medicine,
            "Удостоверение личности. Фамилия: Иванов. Диагноз: ...",
        );

        assert!(!result.has_errors());
        assert!(result.warnings.is_empty());
        assert_eq!(result.type_keywords_matched, vec!["фамилия", "удостоверение"]);
        assert_eq!(result.category_keywords_matched, vec!["диагноз"]);
        assert_eq!(result.matches, vec!["фамилия", "удостоверение", "диагноз"]);
    }

    #[test]
    fn test_missing_category_is_warning_only() {
        let validator = ContentValidator::new();
        let result = validator.validate(
            DocumentType::Income,
            CampaignCategory::Animals,
            "Справка о доходах за 2023",
        );

        assert!(!result.has_errors());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("animals"));
        assert_eq!(result.matches, vec!["доход", "справка о доходах"]);
    }

    #[test]
    fn test_missing_type_keyword_is_error() {
        let validator = ContentValidator::new();
        let result = validator.validate(
            DocumentType::Supporting,
            CampaignCategory::Emergency,
            "Акт о пожаре",
        );

        assert!(result.has_errors());
        assert!(result.errors[0].contains("supporting"));
        assert_eq!(result.category_keywords_matched, vec!["пожар"]);
        assert_eq!(result.matches, vec!["пожар"]);
    }

    #[test]
    fn test_every_category_has_hints() {
        let validator = ContentValidator::new();
        for category in CampaignCategory::ALL {
            assert!(validator.hints.contains_key(&category), "{category}");
        }
        for doc_type in DocumentType::ALL {
            assert!(validator.requirements.contains_key(&doc_type), "{doc_type}");
        }
    }
}
