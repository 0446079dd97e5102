//! Schema completion: fills optional food-allergy fields the collaborator
//! left out, from the deterministic assessment.
//!
//! The merge policy lives in [`COMPLETION_RULES`]. Each rule names a field,
//! the result kinds it applies to, when it may fire and who wins when both
//! sides have a value.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use super::schema::{is_missing, FoodAllergyAnalysis};
use super::AnalysisKind;
use crate::allergen::{RiskAssessment, RiskLevel};

/// When a rule may inject its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionCondition {
    /// Only when the deterministic layer found a food-allergy risk.
    HasRisk,
}

impl CompletionCondition {
    fn holds(&self, assessment: &RiskAssessment) -> bool {
        match self {
            Self::HasRisk => assessment.has_risk,
        }
    }
}

/// Which side keeps the field when both provide it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePriority {
    /// A present collaborator value is kept untouched.
    Collaborator,
}

#[derive(Debug, Clone, Copy)]
pub struct CompletionRule {
    pub field: &'static str,
    pub applies_to: &'static [AnalysisKind],
    pub condition: CompletionCondition,
    pub priority: SourcePriority,
    pub source: fn(&RiskAssessment) -> Value,
    /// Whether a collaborator value has the field's typed shape.
    pub accepts: fn(&Value) -> bool,
}

const BOTH_KINDS: &[AnalysisKind] = &[AnalysisKind::IngredientRisk, AnalysisKind::SideEffect];

pub const COMPLETION_RULES: &[CompletionRule] = &[
    CompletionRule {
        field: "food_allergy_risk",
        applies_to: BOTH_KINDS,
        condition: CompletionCondition::HasRisk,
        priority: SourcePriority::Collaborator,
        source: risk_level,
        accepts: has_shape::<RiskLevel>,
    },
    CompletionRule {
        field: "matched_food_allergens",
        applies_to: BOTH_KINDS,
        condition: CompletionCondition::HasRisk,
        priority: SourcePriority::Collaborator,
        source: matched_categories,
        accepts: has_shape::<Vec<String>>,
    },
    CompletionRule {
        field: "food_origin_excipients_detected",
        applies_to: BOTH_KINDS,
        condition: CompletionCondition::HasRisk,
        priority: SourcePriority::Collaborator,
        source: detected_ingredients,
        accepts: has_shape::<Vec<String>>,
    },
    CompletionRule {
        field: "food_allergy_analysis",
        applies_to: &[AnalysisKind::SideEffect],
        condition: CompletionCondition::HasRisk,
        priority: SourcePriority::Collaborator,
        source: food_allergy_analysis,
        accepts: has_shape::<FoodAllergyAnalysis>,
    },
];

fn has_shape<T: DeserializeOwned>(value: &Value) -> bool {
    T::deserialize(value).is_ok()
}

fn risk_level(assessment: &RiskAssessment) -> Value {
    json!(assessment.level.as_str())
}

fn matched_categories(assessment: &RiskAssessment) -> Value {
    json!(assessment.matches.categories())
}

fn detected_ingredients(assessment: &RiskAssessment) -> Value {
    json!(assessment.matches.ingredients())
}

fn food_allergy_analysis(assessment: &RiskAssessment) -> Value {
    json!({
        "detected_food_origin_ingredients": assessment.matches.ingredients(),
        "matched_allergens": assessment.matches,
        "risk_assessment": assessment.explanation,
    })
}

/// Remove optional derived fields the collaborator sent in an unusable form:
/// blank, null, or not matching the typed shape. These fields may always be
/// absent, so a bad value is dropped instead of failing the result.
///
/// Returns the fields that were removed.
pub fn discard_unusable_fields(result: &mut Map<String, Value>, kind: AnalysisKind) -> Vec<&'static str> {
    let mut discarded = Vec::new();

    for rule in COMPLETION_RULES.iter().filter(|r| r.applies_to.contains(&kind)) {
        let Some(value) = result.get(rule.field) else {
            continue;
        };
        if is_missing(Some(value)) || !(rule.accepts)(value) {
            tracing::warn!(
                kind = %kind,
                field = rule.field,
                value = %value,
                "Discarding unusable optional field from classification result"
            );
            result.remove(rule.field);
            discarded.push(rule.field);
        }
    }
    discarded
}

/// Apply [`COMPLETION_RULES`] to a collaborator result in place.
///
/// Returns the fields that were injected.
pub fn complete_result(
    result: &mut Map<String, Value>,
    kind: AnalysisKind,
    assessment: &RiskAssessment,
) -> Vec<&'static str> {
    let mut filled = Vec::new();

    for rule in COMPLETION_RULES {
        if !rule.applies_to.contains(&kind) || !rule.condition.holds(assessment) {
            continue;
        }
        if rule.priority == SourcePriority::Collaborator && !is_missing(result.get(rule.field)) {
            continue;
        }
        result.insert(rule.field.to_string(), (rule.source)(assessment));
        filled.push(rule.field);
    }

    if !filled.is_empty() {
        tracing::debug!(kind = %kind, fields = ?filled, "Completed result from deterministic assessment");
    }
    filled
}
