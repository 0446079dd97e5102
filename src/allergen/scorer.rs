use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::matcher::{AllergenMatcher, MatchResult};
use super::registry::AllergenTriggerRegistry;
use super::ScoringError;

/// Ordinal food-allergy risk. Ordering is `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }

    /// 3+ matches → HIGH, 2 → MEDIUM, otherwise LOW.
    pub fn from_match_count(total: usize) -> Self {
        match total {
            0 | 1 => Self::Low,
            2 => Self::Medium,
            _ => Self::High,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic food-allergy assessment for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub has_risk: bool,
    #[serde(rename = "risk_level")]
    pub level: RiskLevel,
    #[serde(rename = "matched_allergens")]
    pub matches: MatchResult,
    pub explanation: String,
}

impl RiskAssessment {
    pub fn no_risk(explanation: impl Into<String>) -> Self {
        Self {
            has_risk: false,
            level: RiskLevel::Low,
            matches: MatchResult::default(),
            explanation: explanation.into(),
        }
    }
}

/// Turns allergen matches into a [`RiskAssessment`].
///
/// Never fails: invalid input and matcher faults degrade to a no-risk
/// assessment whose explanation carries the diagnostic.
#[derive(Debug, Clone, Copy)]
pub struct RiskScorer<'r> {
    matcher: AllergenMatcher<'r>,
}

impl<'r> RiskScorer<'r> {
    pub fn new(registry: &'r AllergenTriggerRegistry) -> Self {
        Self {
            matcher: AllergenMatcher::new(registry),
        }
    }

    pub fn score<A, I>(&self, allergies: &[A], ingredients: &[I]) -> RiskAssessment
    where
        A: AsRef<str>,
        I: AsRef<str>,
    {
        self.try_score(allergies, ingredients)
            .unwrap_or_else(degrade)
    }

    /// Score untyped input. Anything other than an array of strings on either
    /// side is invalid input and yields the no-risk assessment.
    pub fn score_json(&self, allergies: &Value, ingredients: &Value) -> RiskAssessment {
        string_list(allergies, "allergies")
            .and_then(|a| string_list(ingredients, "ingredients").map(|i| (a, i)))
            .map(|(a, i)| self.score(&a, &i))
            .unwrap_or_else(degrade)
    }

    fn try_score<A, I>(&self, allergies: &[A], ingredients: &[I]) -> Result<RiskAssessment, ScoringError>
    where
        A: AsRef<str>,
        I: AsRef<str>,
    {
        if allergies.is_empty() || ingredients.is_empty() {
            return Ok(RiskAssessment::no_risk(
                "No food allergy or ingredient information was provided.",
            ));
        }
        assess(|| self.matcher.find_matching_excipients(allergies, ingredients))
    }
}

/// Run `find` with panics contained, then grade whatever it matched.
fn assess<F>(find: F) -> Result<RiskAssessment, ScoringError>
where
    F: FnOnce() -> MatchResult,
{
    let matches = catch_unwind(AssertUnwindSafe(find))
        .map_err(|payload| ScoringError::MatchEngineFault(panic_message(payload.as_ref())))?;

    if matches.is_empty() {
        return Ok(RiskAssessment::no_risk(
            "No food-allergy related excipients were detected.",
        ));
    }

    let level = RiskLevel::from_match_count(matches.total_matches());
    let details: Vec<String> = matches
        .iter()
        .map(|m| format!("{}: {}", m.category, m.ingredients.join(", ")))
        .collect();

    Ok(RiskAssessment {
        has_risk: true,
        level,
        explanation: format!(
            "Food-allergy related excipients detected. {}",
            details.join("; ")
        ),
        matches,
    })
}

fn degrade(error: ScoringError) -> RiskAssessment {
    match &error {
        ScoringError::InvalidInput { .. } => {
            tracing::warn!(error = %error, "Invalid scoring input, reporting no risk")
        }
        ScoringError::MatchEngineFault(_) => {
            tracing::error!(error = %error, "Allergen matching fault, reporting no risk")
        }
    }
    RiskAssessment::no_risk(format!("Food allergy assessment unavailable: {error}"))
}

fn string_list(value: &Value, field: &'static str) -> Result<Vec<String>, ScoringError> {
    let items = value.as_array().ok_or_else(|| ScoringError::InvalidInput {
        field,
        reason: format!("expected an array, got {}", json_type(value)),
    })?;

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| ScoringError::InvalidInput {
                    field,
                    reason: format!("expected string items, got {}", json_type(item)),
                })
        })
        .collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
