use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::RegistryError;

/// A lexical token that signals a food-derived allergen in an ingredient name.
///
/// The boundary pattern is compiled once when the term is built. A term whose
/// pattern fails to compile keeps `boundary = None` and is matched with the
/// manual boundary check instead.
#[derive(Debug, Clone)]
pub struct TriggerTerm {
    text: String,
    loose: bool,
    boundary: Option<Regex>,
}

impl TriggerTerm {
    pub fn new(text: &str, loose: bool) -> Self {
        let text = text.trim().to_lowercase();
        let boundary = match compile_boundary_pattern(&text) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(
                    trigger = %text,
                    error = %e,
                    "Boundary pattern unavailable, using manual boundary check"
                );
                None
            }
        };
        Self {
            text,
            loose,
            boundary,
        }
    }

    /// A term with no compiled pattern, as left behind by a compile failure.
    #[cfg(test)]
    pub(crate) fn without_boundary(text: &str, loose: bool) -> Self {
        Self {
            text: text.trim().to_lowercase(),
            loose,
            boundary: None,
        }
    }

    /// Lowercased, trimmed term text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Loose terms match anywhere inside an ingredient (compound words).
    pub fn is_loose(&self) -> bool {
        self.loose
    }

    pub(crate) fn boundary(&self) -> Option<&Regex> {
        self.boundary.as_ref()
    }
}

impl PartialEq for TriggerTerm {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text && self.loose == other.loose
    }
}

/// Word characters are Unicode alphanumerics (Alphabetic or Numeric), for every
/// script. Underscore and punctuation separate words.
const WORD_CLASS: &str = r"[\p{Alphabetic}\p{N}]";

/// `(^|non-word) term (non-word|$)`, evaluated against lowercased input.
fn compile_boundary_pattern(term: &str) -> Result<Regex, regex::Error> {
    let not_word = WORD_CLASS.replacen('[', "[^", 1);
    Regex::new(&format!(
        r"(?:^|{not_word}){}(?:{not_word}|$)",
        regex::escape(term)
    ))
}

/// One allergy category: canonical label, alias keys and ordered trigger terms.
#[derive(Debug, Clone)]
pub struct AllergyCategory {
    pub label: String,
    pub aliases: Vec<String>,
    pub triggers: Vec<TriggerTerm>,
}

/// Raw table row: (canonical label, aliases, strict triggers, loose triggers).
pub type CategoryEntry<'a> = (&'a str, &'a [&'a str], &'a [&'a str], &'a [&'a str]);

const BUILTIN_CATEGORIES: &[CategoryEntry<'static>] = &[
    (
        "peanut",
        &["땅콩"],
        &["땅콩", "땅콩유", "땅콩기름", "peanut", "peanut oil", "arachis oil"],
        &[],
    ),
    (
        "gluten",
        &["글루텐"],
        &["글루텐", "밀전분", "밀단백질", "밀", "gluten", "wheat", "wheat starch", "wheat protein"],
        &[],
    ),
    (
        "lactose",
        &["유당"],
        &["유당", "락토스", "lactose", "lactose monohydrate"],
        &[],
    ),
    (
        "shellfish",
        &["갑각류"],
        &["갑각류", "새우", "게", "크랩", "shrimp", "crab", "crustacean"],
        &[],
    ),
    (
        "egg",
        &["계란"],
        &["계란", "난백", "계란알부민", "egg", "albumin", "egg white", "ovalbumin", "lysozyme"],
        &[],
    ),
    (
        "soy",
        &["대두"],
        &["대두", "콩", "대두유", "대두레시틴", "soy", "soybean", "lecithin", "soy lecithin"],
        &[],
    ),
    (
        "milk",
        &["우유"],
        &["우유", "카제인", "유청", "milk", "casein", "milk protein", "whey"],
        &[],
    ),
    (
        "gelatin",
        &["젤라틴"],
        &["소젤라틴", "돼지젤라틴", "bovine gelatin", "porcine gelatin", "gelatin capsule"],
        &["젤라틴", "gelatin"],
    ),
    (
        "tree-nut",
        &["견과류", "tree nut"],
        &["호두", "아몬드", "헤이즐넛", "walnut", "almond", "hazelnut", "nuts"],
        &[],
    ),
    (
        "sesame",
        &["참깨"],
        &["참깨", "참기름", "sesame", "sesame oil", "sesame seed"],
        &[],
    ),
];

static BUILTIN: LazyLock<Arc<AllergenTriggerRegistry>> = LazyLock::new(|| {
    let categories = BUILTIN_CATEGORIES
        .iter()
        .map(|&(label, aliases, strict, loose)| build_category(label, aliases, strict, loose))
        .collect();
    Arc::new(AllergenTriggerRegistry { categories })
});

/// Immutable allergy-category → trigger-term table.
///
/// Built once and shared by `Arc`; there is no mutation path after
/// construction, so concurrent readers need no locking.
#[derive(Debug)]
pub struct AllergenTriggerRegistry {
    categories: Vec<AllergyCategory>,
}

impl AllergenTriggerRegistry {
    /// The process-wide built-in table.
    pub fn builtin() -> Arc<Self> {
        Arc::clone(&BUILTIN)
    }

    /// Build a registry from a custom table. Every key (label or alias) must be
    /// unique, compared case-insensitively.
    pub fn from_entries(entries: &[CategoryEntry<'_>]) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        let mut categories = Vec::with_capacity(entries.len());

        for &(label, aliases, strict, loose) in entries {
            if label.trim().is_empty() {
                return Err(RegistryError::EmptyLabel);
            }
            for key in std::iter::once(&label).chain(aliases.iter()) {
                if !seen.insert(key.trim().to_lowercase()) {
                    return Err(RegistryError::DuplicateKey(key.trim().to_string()));
                }
            }
            categories.push(build_category(label, aliases, strict, loose));
        }

        Ok(Self { categories })
    }

    /// Canonical category labels in table order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.label.as_str())
    }

    /// Resolve a category label to its trigger terms.
    ///
    /// Exact key match, then case-insensitive key match, then a single-term
    /// set made of the label itself so unknown allergies still participate.
    pub fn lookup(&self, category: &str) -> Cow<'_, [TriggerTerm]> {
        let label = category.trim();
        if label.is_empty() {
            return Cow::Owned(Vec::new());
        }

        if let Some(found) = self.categories.iter().find(|c| c.has_key(label)) {
            return Cow::Borrowed(&found.triggers);
        }

        let lower = label.to_lowercase();
        if let Some(found) = self
            .categories
            .iter()
            .find(|c| c.keys().any(|k| k.to_lowercase() == lower))
        {
            return Cow::Borrowed(&found.triggers);
        }

        tracing::debug!(category = %label, "Unknown allergy category, matching on label");
        Cow::Owned(vec![TriggerTerm::new(label, false)])
    }

    /// The table's own trigger term with this text, if any.
    pub fn find_term(&self, term: &str) -> Option<&TriggerTerm> {
        let lower = term.trim().to_lowercase();
        self.categories
            .iter()
            .flat_map(|c| c.triggers.iter())
            .find(|t| t.text() == lower)
    }

    /// Whether `term` is a loose-containment trigger anywhere in the table.
    pub fn is_loose_term(&self, term: &str) -> bool {
        self.find_term(term).is_some_and(TriggerTerm::is_loose)
    }
}

impl AllergyCategory {
    fn keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.label.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    fn has_key(&self, key: &str) -> bool {
        self.keys().any(|k| k == key)
    }
}

fn build_category(label: &str, aliases: &[&str], strict: &[&str], loose: &[&str]) -> AllergyCategory {
    let mut triggers: Vec<TriggerTerm> = Vec::with_capacity(strict.len() + loose.len());
    let terms = loose
        .iter()
        .map(|t| (*t, true))
        .chain(strict.iter().map(|t| (*t, false)));

    for (text, is_loose) in terms {
        let term = TriggerTerm::new(text, is_loose);
        if term.text().is_empty() || triggers.iter().any(|t| t.text() == term.text()) {
            continue;
        }
        triggers.push(term);
    }

    AllergyCategory {
        label: label.trim().to_string(),
        aliases: aliases.iter().map(|a| a.trim().to_string()).collect(),
        triggers,
    }
}
