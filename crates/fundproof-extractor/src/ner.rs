//! Named Entity Recognition (NER) module
//!
//! Rule-based recognizer for Kazakh, Russian and English document text:
//! - regex patterns for person names, "г. <city>" and legal-form organizations
//! - dictionary of known places and organizations with inflected aliases
//! - overlap resolution keeping the strongest candidate per span

use std::collections::HashSet;

use fundproof_core::{EntityTag, ExtractedEntity, Result};
use regex::Regex;

use crate::lemma::{title_case, Lemmatizer};
use crate::EntityExtractor;

// Cyrillic letter classes including the Kazakh additions
const UPPER: &str = "[А-ЯЁӘҒҚҢӨҰҮҺІ]";
const LOWER: &str = "[а-яёәғқңөұүһі]";

/// How a normal form is derived from a pattern match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternKind {
    Person,
    City,
    LegalEntity,
}

/// Dictionary entry for entity matching
#[derive(Debug, Clone)]
pub struct DictionaryEntry {
    pub term: String,
    pub tag: EntityTag,
    pub aliases: Vec<String>,
    matcher: Regex,
}

/// Candidate span before overlap resolution
#[derive(Debug, Clone)]
struct Candidate {
    entity: ExtractedEntity,
    score: f32,
}

/// Rule-based NER using regex patterns and dictionaries
pub struct RuleBasedNer {
    patterns: Vec<(Regex, PatternKind, f32)>,
    dictionary: Vec<DictionaryEntry>,
    lemmatizer: Lemmatizer,
}

impl RuleBasedNer {
    /// Create a recognizer with the built-in patterns and dictionary
    pub fn new() -> Self {
        let mut ner = Self {
            patterns: Vec::new(),
            dictionary: Vec::new(),
            lemmatizer: Lemmatizer::new(),
        };

        ner.init_patterns();
        ner.init_dictionary();
        ner
    }

    fn init_patterns(&mut self) {
        let surname = format!(
            "{UPPER}{LOWER}+(?:ов|ев|ёв|ин|ын|ова|ева|ёва|ина|ына|ский|ская|цкий|цкая|енко|ук|юк|бек|баев|баева)(?:а|у|ым|ой|ом|е)?"
        );
        let given = format!("{UPPER}{LOWER}+");
        let patronymic =
            format!("{UPPER}{LOWER}+(?:вич|вна|вича|вны|вичу|вне|ұлы|қызы|улы|кызы)");

        // Surname first: "Иванов Иван Петрович"
        self.add_pattern(
            &format!(r"\b{surname}\s+{given}(?:\s+{patronymic})?\b"),
            PatternKind::Person,
            0.85,
        );
        // Given name first: "Иван Петрович Иванов"
        self.add_pattern(
            &format!(r"\b{given}\s+(?:{patronymic}\s+)?{surname}\b"),
            PatternKind::Person,
            0.8,
        );

        self.add_pattern(
            &format!(r"\bг\.\s*{UPPER}{LOWER}+(?:-{UPPER}{LOWER}+)?"),
            PatternKind::City,
            0.9,
        );

        self.add_pattern(
            r#"\b(?:ТОО|АО|ИП|ООО|ОАО|ЗАО|РГП|ГКП|КГП|ОФ|ОЮЛ|LLP|JSC)\s*[«"“„][^»"”\n]{1,80}[»"”]"#,
            PatternKind::LegalEntity,
            0.9,
        );
    }

    fn init_dictionary(&mut self) {
        use EntityTag::{Location, Organization};

        // Places
        self.add_term("Казахстан", Location, vec!["Казахстана", "Казахстане", "Kazakhstan", "Қазақстан"]);
        self.add_term("Алматы", Location, vec!["Almaty", "Алма-Ата"]);
        self.add_term("Астана", Location, vec!["Астаны", "Астане", "Астану", "Астаной", "Astana", "Нур-Султан"]);
        self.add_term("Шымкент", Location, vec!["Шымкента", "Шымкенте", "Shymkent"]);
        self.add_term("Караганда", Location, vec!["Караганды", "Караганде", "Қарағанды", "Karaganda"]);
        self.add_term("Актобе", Location, vec!["Ақтөбе", "Aktobe"]);
        self.add_term("Павлодар", Location, vec!["Павлодара", "Павлодаре"]);
        self.add_term("Усть-Каменогорск", Location, vec!["Усть-Каменогорска", "Усть-Каменогорске", "Өскемен"]);
        self.add_term("Семей", Location, vec!["Семея", "Семее"]);
        self.add_term("Атырау", Location, vec!["Atyrau"]);
        self.add_term("Костанай", Location, vec!["Костаная", "Костанае", "Қостанай"]);
        self.add_term("Тараз", Location, vec!["Тараза", "Таразе"]);
        self.add_term("Россия", Location, vec!["России", "Россию", "Russia"]);
        self.add_term("Москва", Location, vec!["Москвы", "Москве", "Москву", "Moscow"]);

        // Organizations
        self.add_term("Kaspi Bank", Organization, vec!["Kaspi", "Каспи", "Каспи Банк"]);
        self.add_term("Halyk Bank", Organization, vec!["Halyk", "Халык", "Народный банк"]);
        self.add_term("Казпочта", Organization, vec!["Kazpost", "Казпочты"]);
        self.add_term("ЦОН", Organization, vec!["Центр обслуживания населения"]);
        self.add_term("МЧС", Organization, vec!["ДЧС"]);
        self.add_term("ЕНПФ", Organization, vec!["Единый накопительный пенсионный фонд"]);
        self.add_term("Правительство для граждан", Organization, vec!["Government for Citizens"]);
    }

    /// Add a regex pattern
    fn add_pattern(&mut self, pattern: &str, kind: PatternKind, score: f32) {
        match Regex::new(pattern) {
            Ok(regex) => self.patterns.push((regex, kind, score)),
            Err(e) => tracing::warn!(pattern, error = %e, "skipping invalid NER pattern"),
        }
    }

    /// Add a dictionary term; the term itself is the normal form
    fn add_term(&mut self, term: &str, tag: EntityTag, aliases: Vec<&str>) {
        let mut forms: Vec<&str> = std::iter::once(term).chain(aliases.iter().copied()).collect();
        // Alternation is leftmost-first: try longer forms before their prefixes
        forms.sort_by_key(|f| std::cmp::Reverse(f.chars().count()));

        let alternation = forms
            .iter()
            .map(|f| regex::escape(f))
            .collect::<Vec<_>>()
            .join("|");

        match Regex::new(&format!(r"(?i)\b(?:{alternation})\b")) {
            Ok(matcher) => self.dictionary.push(DictionaryEntry {
                term: term.to_string(),
                tag,
                aliases: aliases.iter().map(|s| s.to_string()).collect(),
                matcher,
            }),
            Err(e) => tracing::warn!(term, error = %e, "skipping invalid dictionary term"),
        }
    }

    /// Canonical form of a known place, if any alias matches exactly
    fn known_location(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.dictionary
            .iter()
            .filter(|entry| entry.tag == EntityTag::Location)
            .find(|entry| {
                entry.term.to_lowercase() == name
                    || entry.aliases.iter().any(|a| a.to_lowercase() == name)
            })
            .map(|entry| entry.term.as_str())
    }

    fn normalize(&self, kind: PatternKind, span: &str) -> (EntityTag, String) {
        match kind {
            PatternKind::Person => (EntityTag::Person, self.lemmatizer.person(span)),
            PatternKind::City => {
                let name = span.trim_start_matches("г.").trim();
                let normal = self
                    .known_location(name)
                    .map(str::to_string)
                    .unwrap_or_else(|| title_case(name));
                (EntityTag::Location, normal)
            }
            PatternKind::LegalEntity => {
                (EntityTag::Organization, self.lemmatizer.organization(span))
            }
        }
    }

    /// Extract entities using pattern matching
    fn extract_by_patterns(&self, text: &str) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        for (regex, kind, score) in &self.patterns {
            for mat in regex.find_iter(text) {
                let (tag, normal) = self.normalize(*kind, mat.as_str());
                candidates.push(Candidate {
                    entity: ExtractedEntity {
                        text: mat.as_str().to_string(),
                        tag,
                        normal,
                        start: mat.start(),
                        end: mat.end(),
                    },
                    score: *score,
                });
            }
        }

        candidates
    }

    /// Extract entities using dictionary lookup
    fn extract_by_dictionary(&self, text: &str) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        for entry in &self.dictionary {
            for mat in entry.matcher.find_iter(text) {
                candidates.push(Candidate {
                    entity: ExtractedEntity {
                        text: mat.as_str().to_string(),
                        tag: entry.tag,
                        normal: entry.term.clone(),
                        start: mat.start(),
                        end: mat.end(),
                    },
                    score: 0.95,
                });
            }
        }

        candidates
    }

    /// Remove overlapping candidates, earliest start first, then highest score
    fn deduplicate(&self, mut candidates: Vec<Candidate>) -> Vec<ExtractedEntity> {
        candidates.sort_by(|a, b| {
            a.entity
                .start
                .cmp(&b.entity.start)
                .then(b.score.total_cmp(&a.score))
                .then(b.entity.end.cmp(&a.entity.end))
        });

        let mut result = Vec::new();
        let mut covered: HashSet<usize> = HashSet::new();

        for candidate in candidates {
            let span = candidate.entity.start..candidate.entity.end;
            if span.clone().any(|i| covered.contains(&i)) {
                continue;
            }
            covered.extend(span);
            result.push(candidate.entity);
        }

        result.sort_by_key(|e| e.start);
        result
    }
}

impl Default for RuleBasedNer {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityExtractor for RuleBasedNer {
    fn extract(&self, text: &str) -> Result<Vec<ExtractedEntity>> {
        let mut candidates = self.extract_by_patterns(text);
        candidates.extend(self.extract_by_dictionary(text));

        let entities = self.deduplicate(candidates);
        tracing::debug!(count = entities.len(), "entities extracted");
        Ok(entities)
    }
}

// ============================================================================
// Tests
// ============================================================================
