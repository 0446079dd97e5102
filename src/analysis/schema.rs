use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{AnalysisError, AnalysisKind};
use crate::allergen::{MatchResult, RiskLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SafetyLevel {
    Safe,
    Caution,
    Dangerous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientRisk {
    pub ingredient_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allergy_risk: Option<String>,
    pub risk_level: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientAnalysisResult {
    pub safety_level: SafetyLevel,
    pub ingredient_risks: Vec<IngredientRisk>,
    pub expected_side_effects: Vec<String>,
    pub overall_assessment: String,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food_allergy_risk: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_food_allergens: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food_origin_excipients_detected: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitiveIngredient {
    pub ingredient_name: String,
    pub reason: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonSideEffectIngredient {
    pub ingredient_name: String,
    pub side_effect_description: String,
    pub frequency: String,
}

/// Composite food-allergy view attached to side-effect results.
///
/// `matched_allergens` keeps category order as sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodAllergyAnalysis {
    pub detected_food_origin_ingredients: Vec<String>,
    pub matched_allergens: MatchResult,
    pub risk_assessment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideEffectAnalysisResult {
    pub common_ingredients: Vec<String>,
    pub user_sensitive_ingredients: Vec<SensitiveIngredient>,
    pub common_side_effect_ingredients: Vec<CommonSideEffectIngredient>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food_allergy_risk: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_food_allergens: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food_origin_excipients_detected: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food_allergy_analysis: Option<FoodAllergyAnalysis>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrNormalizationResult {
    pub normalized_ingredients: Vec<String>,
    pub cleaned_text: String,
    /// Set when the token list came from the local fallback.
    #[serde(skip)]
    pub used_fallback: bool,
}

/// A collaborator result type with a required-field schema.
pub trait AnalysisSchema: DeserializeOwned {
    const KIND: AnalysisKind;
    /// Mandatory analytical fields. Never filled locally.
    const REQUIRED_FIELDS: &'static [&'static str];
}

impl AnalysisSchema for IngredientAnalysisResult {
    const KIND: AnalysisKind = AnalysisKind::IngredientRisk;
    const REQUIRED_FIELDS: &'static [&'static str] = &[
        "safety_level",
        "ingredient_risks",
        "expected_side_effects",
        "overall_assessment",
        "recommendations",
    ];
}

impl AnalysisSchema for SideEffectAnalysisResult {
    const KIND: AnalysisKind = AnalysisKind::SideEffect;
    const REQUIRED_FIELDS: &'static [&'static str] = &[
        "common_ingredients",
        "user_sensitive_ingredients",
        "common_side_effect_ingredients",
        "summary",
    ];
}

/// Check required fields, then deserialize into the strict typed result.
///
/// A required field that is absent, null or a blank string is a
/// [`AnalysisError::SchemaViolation`]; wrong types or out-of-range enum values
/// are [`AnalysisError::MalformedResult`].
pub fn validate_result<T: AnalysisSchema>(result: Map<String, Value>) -> Result<T, AnalysisError> {
    if let Some(field) = T::REQUIRED_FIELDS
        .iter()
        .copied()
        .find(|field| is_missing(result.get(*field)))
    {
        return Err(AnalysisError::SchemaViolation {
            kind: T::KIND,
            field,
        });
    }

    serde_json::from_value(Value::Object(result)).map_err(|e| AnalysisError::MalformedResult {
        kind: T::KIND,
        detail: e.to_string(),
    })
}

pub(crate) fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}
