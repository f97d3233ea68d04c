//! Pattern-based entity extraction.
//!
//! Each entity kind is extracted independently; within a kind the first
//! matching pattern or vocabulary entry wins. Extraction is total: any input
//! yields a (possibly empty) [`EntitySet`].

use std::sync::LazyLock;

use aulabot_shared::{Course, EntitySet};
use regex::Regex;
use tracing::debug;

// ---------------------------------------------------------------------------
// Vocabularies
// ---------------------------------------------------------------------------

const SPECIALTIES: &[&str] = &[
    "informática",
    "electromecánica",
    "construcciones",
    "química",
    "programación",
    "sistemas",
    "mecánica",
    "construcción",
];

const SUBJECTS: &[&str] = &[
    "matemática",
    "matemáticas",
    "lengua",
    "literatura",
    "historia",
    "geografía",
    "física",
    "química",
    "biología",
    "inglés",
    "educación física",
    "taller",
    "prácticas",
    "tecnología",
];

const SHIFTS: &[&str] = &["mañana", "tarde", "contraturno", "vespertino", "matutino"];

const TOPICS: &[&str] = &["asistencia", "inasistencia", "ausencia", "falta"];

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// `3° B`, `3º b`, `3 año b`.
static COURSE_WITH_DIVISION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*(?:°|º|grado|año)\s*([a-z])\b").expect("course+division regex")
});

/// `B 3°`. Matched against the original casing so the Spanish
/// preposition "a" is not read as a division.
static DIVISION_THEN_COURSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z])\s+(\d+)\s*(?:°|º|grado|año)").expect("division+course regex")
});

/// `3°` on its own.
static COURSE_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*(?:°|º|grado|año)").expect("course year regex"));

/// `de Juan Pérez`.
static NAME_AFTER_DE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bde\s+(\p{Lu}\p{L}*(?:\s+\p{Lu}\p{L}*)*)").expect("name after 'de' regex")
});

/// `Juan Pérez tiene`, `Ana es`, `Luis está`.
static NAME_BEFORE_VERB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\p{Lu}\p{L}*(?:\s+\p{Lu}\p{L}*)*)\s+(?:tiene|es|está)\b")
        .expect("name before verb regex")
});

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("number regex"));

// ---------------------------------------------------------------------------
// EntityExtractor
// ---------------------------------------------------------------------------

/// Pulls courses, vocabulary terms, person names, and numbers out of a question.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityExtractor;

impl EntityExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, text: &str) -> EntitySet {
        let original = text.trim();
        let lower = original.to_lowercase();

        let entities = EntitySet {
            course: extract_course(original, &lower),
            specialty: first_term(&lower, SPECIALTIES),
            subject: first_term(&lower, SUBJECTS),
            shift: first_term(&lower, SHIFTS),
            person_name: extract_name(original),
            topic: first_term(&lower, TOPICS),
            numbers: extract_numbers(&lower),
        };

        debug!(?entities, "extracted entities");
        entities
    }
}

fn extract_course(original: &str, lower: &str) -> Option<Course> {
    if let Some(caps) = COURSE_WITH_DIVISION_RE.captures(lower) {
        if let Ok(year) = caps[1].parse() {
            return Some(Course::new(year, Some(&caps[2])));
        }
    }
    if let Some(caps) = DIVISION_THEN_COURSE_RE.captures(original) {
        if let Ok(year) = caps[2].parse() {
            return Some(Course::new(year, Some(&caps[1])));
        }
    }
    COURSE_YEAR_RE
        .captures(lower)
        .and_then(|caps| caps[1].parse().ok())
        .map(|year| Course::new(year, None))
}

/// First vocabulary entry (in list order) found anywhere in the text.
fn first_term(lower: &str, vocabulary: &[&str]) -> Option<String> {
    vocabulary
        .iter()
        .find(|term| lower.contains(*term))
        .map(|term| term.to_string())
}

/// Best-effort: capitalized words after "de", else before "tiene/es/está".
/// Sentence-initial capitals and proper nouns that are not people can match.
fn extract_name(original: &str) -> Option<String> {
    [&*NAME_AFTER_DE_RE, &*NAME_BEFORE_VERB_RE]
        .into_iter()
        .find_map(|re| re.captures(original))
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty())
}

fn extract_numbers(lower: &str) -> Vec<u64> {
    NUMBER_RE
        .find_iter(lower)
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}
