use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::registry::{AllergenTriggerRegistry, TriggerTerm};

/// Ingredients matched for one allergy category, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryMatches {
    pub category: String,
    pub ingredients: Vec<String>,
}

/// Allergy category → matched ingredients.
///
/// Categories keep the order of the supplied allergy list. A category with no
/// matches is never stored, so an entry always has at least one ingredient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    entries: Vec<CategoryMatches>,
}

impl MatchResult {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of categories with at least one match.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryMatches> {
        self.entries.iter()
    }

    pub fn get(&self, category: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|e| e.category == category)
            .map(|e| e.ingredients.as_slice())
    }

    pub fn categories(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.category.clone()).collect()
    }

    /// Sum of matched ingredients across categories.
    pub fn total_matches(&self) -> usize {
        self.entries.iter().map(|e| e.ingredients.len()).sum()
    }

    /// Matched ingredients across all categories, de-duplicated, first-seen order.
    pub fn ingredients(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for ingredient in self.entries.iter().flat_map(|e| e.ingredients.iter()) {
            if !out.contains(ingredient) {
                out.push(ingredient.clone());
            }
        }
        out
    }

    fn record(&mut self, category: &str, ingredients: Vec<String>) {
        if ingredients.is_empty() {
            return;
        }
        match self.entries.iter_mut().find(|e| e.category == category) {
            Some(existing) => {
                for ingredient in ingredients {
                    if !existing.ingredients.contains(&ingredient) {
                        existing.ingredients.push(ingredient);
                    }
                }
            }
            None => self.entries.push(CategoryMatches {
                category: category.to_string(),
                ingredients,
            }),
        }
    }
}

impl Serialize for MatchResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.category, &entry.ingredients)?;
        }
        map.end()
    }
}

/// Reads the same category → ingredients map back, keeping entry order.
/// Empty lists are skipped and repeated categories merged.
impl<'de> Deserialize<'de> for MatchResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MatchResultVisitor;

        impl<'de> Visitor<'de> for MatchResultVisitor {
            type Value = MatchResult;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of allergy category to ingredient names")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<MatchResult, M::Error> {
                let mut result = MatchResult::default();
                while let Some((category, ingredients)) = access.next_entry::<String, Vec<String>>()? {
                    result.record(&category, ingredients);
                }
                Ok(result)
            }
        }

        deserializer.deserialize_map(MatchResultVisitor)
    }
}

/// Lexical matcher over an allergen registry.
#[derive(Debug, Clone, Copy)]
pub struct AllergenMatcher<'r> {
    registry: &'r AllergenTriggerRegistry,
}

impl<'r> AllergenMatcher<'r> {
    pub fn new(registry: &'r AllergenTriggerRegistry) -> Self {
        Self { registry }
    }

    /// Does `trigger` occur in `ingredient`?
    ///
    /// A trigger known to the registry is matched with the table's own term,
    /// so looseness and the compiled pattern come from there. Other triggers
    /// are strict and compiled on the spot.
    pub fn is_match(&self, trigger: &str, ingredient: &str) -> bool {
        match self.registry.find_term(trigger) {
            Some(term) => term_matches(term, ingredient),
            None => term_matches(&TriggerTerm::new(trigger, false), ingredient),
        }
    }

    /// Correlate allergy categories with ingredients.
    pub fn find_matching_excipients<A, I>(&self, allergies: &[A], ingredients: &[I]) -> MatchResult
    where
        A: AsRef<str>,
        I: AsRef<str>,
    {
        let mut result = MatchResult::default();

        for allergy in allergies {
            let category = allergy.as_ref().trim();
            let triggers = self.registry.lookup(category);
            let mut matched: Vec<String> = Vec::new();

            for trigger in triggers.iter() {
                for ingredient in ingredients {
                    let ingredient = ingredient.as_ref().trim();
                    if term_matches(trigger, ingredient) && !matched.iter().any(|m| m == ingredient) {
                        matched.push(ingredient.to_string());
                    }
                }
            }

            result.record(category, matched);
        }

        result
    }
}

/// Match a single trigger term against one ingredient name.
///
/// 1. exact case-insensitive equality
/// 2. loose terms: plain substring containment
/// 3. boundary match: the term bounded by non-alphanumerics or string edges
/// 4. no compiled pattern: manual check around the first occurrence
pub fn term_matches(term: &TriggerTerm, ingredient: &str) -> bool {
    let trigger = term.text();
    let ingredient = ingredient.trim().to_lowercase();
    if trigger.is_empty() || ingredient.is_empty() {
        return false;
    }

    if ingredient == trigger {
        return true;
    }

    if term.is_loose() {
        return ingredient.contains(trigger);
    }

    match term.boundary() {
        Some(pattern) => pattern.is_match(&ingredient),
        None => manual_boundary_match(trigger, &ingredient),
    }
}

/// Substring search plus a non-alphanumeric check on both neighbours of the
/// first occurrence. Later occurrences are not considered.
pub(crate) fn manual_boundary_match(trigger: &str, ingredient: &str) -> bool {
    let Some(start) = ingredient.find(trigger) else {
        return false;
    };
    let end = start + trigger.len();

    let before_ok = ingredient[..start]
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_alphanumeric());
    let after_ok = ingredient[end..]
        .chars()
        .next()
        .map_or(true, |c| !c.is_alphanumeric());

    before_ok && after_ok
}
