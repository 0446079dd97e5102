use serde::{Deserialize, Serialize};

/// Single-label ingredient risk analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngredientAnalysisRequest {
    pub ingredients: Vec<String>,
    /// Medication allergies, forwarded to the collaborator only.
    #[serde(default)]
    pub allergy_ingredients: Vec<String>,
    /// Food allergy categories, scored deterministically.
    #[serde(default)]
    pub food_allergies: Vec<String>,
}

/// Side-effect report across several medications taken together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SideEffectAnalysisRequest {
    pub medication_names: Vec<String>,
    /// One ingredient group per medication, aligned with `medication_names`.
    pub medication_ingredients: Vec<Vec<String>>,
    #[serde(default)]
    pub allergy_ingredients: Vec<String>,
    #[serde(default)]
    pub food_allergies: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl SideEffectAnalysisRequest {
    /// Every ingredient of every medication, in group order.
    pub fn all_ingredients(&self) -> Vec<&str> {
        self.medication_ingredients
            .iter()
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// Display name for the medication at `index`.
    pub fn medication_name(&self, index: usize) -> String {
        self.medication_names
            .get(index)
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Medication {}", index + 1))
    }
}

/// Raw OCR text from a medication label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrNormalizeRequest {
    pub ocr_text: String,
}

/// Any analysis request, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisRequest {
    Ingredients(IngredientAnalysisRequest),
    SideEffects(SideEffectAnalysisRequest),
    Ocr(OcrNormalizeRequest),
}
