use std::fmt::Write;

use super::request::{IngredientAnalysisRequest, SideEffectAnalysisRequest};
use crate::allergen::RiskAssessment;

const FOOD_ALLERGY_FORMAT: &str = r#",
  "food_allergy_risk": "LOW|MEDIUM|HIGH",
  "matched_food_allergens": ["allergy category"],
  "food_origin_excipients_detected": ["ingredient"]"#;

/// Build the ingredient risk instruction, seeded with the deterministic
/// food-allergy findings.
pub fn build_ingredient_prompt(
    request: &IngredientAnalysisRequest,
    assessment: &RiskAssessment,
) -> String {
    let mut prompt = String::from("Ingredients extracted from a medication label:\n");
    push_bullets(&mut prompt, &request.ingredients);
    prompt.push('\n');

    if !request.allergy_ingredients.is_empty() {
        prompt.push_str("The user's medication allergies:\n");
        push_bullets(&mut prompt, &request.allergy_ingredients);
        prompt.push('\n');
    }

    let has_food = !request.food_allergies.is_empty();
    if has_food {
        push_food_allergy_hints(&mut prompt, &request.food_allergies, assessment);
    }

    prompt.push_str(
        "Respond with a single JSON object containing:\n\
         1. ingredient_risks: per ingredient, its name, content if known, allergy risk, risk level and reason\n\
         2. expected_side_effects: side effects expected when taking this medication\n\
         3. overall_assessment: overall safety assessment of this medication\n\
         4. safety_level: one of SAFE, CAUTION, DANGEROUS\n\
         5. recommendations: precautions and recommendations before taking it\n\n",
    );

    let _ = write!(
        prompt,
        r#"JSON format:
{{
  "safety_level": "SAFE|CAUTION|DANGEROUS",
  "ingredient_risks": [
    {{
      "ingredient_name": "name",
      "content": "content or null",
      "allergy_risk": "allergy risk description or null",
      "risk_level": "LOW|MEDIUM|HIGH",
      "reason": "reason or null"
    }}
  ],
  "expected_side_effects": ["side effect"],
  "overall_assessment": "assessment",
  "recommendations": ["recommendation"]{food}
}}"#,
        food = if has_food { FOOD_ALLERGY_FORMAT } else { "" },
    );

    prompt
}

/// Build the side-effect instruction. `common` is the locally computed
/// intersection of the medication ingredient groups.
pub fn build_side_effect_prompt(
    request: &SideEffectAnalysisRequest,
    common: &[String],
    assessment: &RiskAssessment,
) -> String {
    let mut prompt =
        String::from("The user experienced side effects after taking these medications:\n");
    let names: Vec<String> = (0..request.medication_ingredients.len().max(request.medication_names.len()))
        .map(|i| request.medication_name(i))
        .collect();
    push_bullets(&mut prompt, &names);
    prompt.push('\n');

    if let Some(description) = request.description.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        let _ = writeln!(prompt, "Reported side effect: {description}\n");
    }

    prompt.push_str("Ingredients of each medication:\n");
    for (index, group) in request.medication_ingredients.iter().enumerate() {
        let _ = writeln!(prompt, "- {}: {}", request.medication_name(index), group.join(", "));
    }
    prompt.push('\n');

    if !common.is_empty() {
        let _ = writeln!(prompt, "Common ingredients: {}\n", common.join(", "));
    }

    if !request.allergy_ingredients.is_empty() {
        prompt.push_str("The user's medication allergies:\n");
        push_bullets(&mut prompt, &request.allergy_ingredients);
        prompt.push('\n');
    }

    let has_food = !request.food_allergies.is_empty();
    if has_food {
        push_food_allergy_hints(&mut prompt, &request.food_allergies, assessment);
    }

    prompt.push_str(
        "Respond with a single JSON object containing:\n\
         1. common_ingredients: ingredients shared by all medications\n\
         2. user_sensitive_ingredients: ingredients matching or similar to the user's allergies, with reason and severity\n\
         3. common_side_effect_ingredients: ingredients commonly known to cause side effects, with description and frequency\n\
         4. summary: overall summary of the analysis\n\n",
    );

    let food = if has_food {
        format!(
            r#"{FOOD_ALLERGY_FORMAT},
  "food_allergy_analysis": {{
    "detected_food_origin_ingredients": ["ingredient"],
    "matched_allergens": {{"allergy category": ["ingredient"]}},
    "risk_assessment": "assessment"
  }}"#
        )
    } else {
        String::new()
    };

    let _ = write!(
        prompt,
        r#"JSON format:
{{
  "common_ingredients": ["ingredient"],
  "user_sensitive_ingredients": [
    {{
      "ingredient_name": "name",
      "reason": "reason",
      "severity": "MILD|MODERATE|SEVERE"
    }}
  ],
  "common_side_effect_ingredients": [
    {{
      "ingredient_name": "name",
      "side_effect_description": "description",
      "frequency": "frequency"
    }}
  ],
  "summary": "summary"{food}
}}"#
    );

    prompt
}

/// First OCR pass: clean recognition noise, keep content.
pub fn build_ocr_cleanup_prompt(ocr_text: &str) -> String {
    format!(
        r#"The following is OCR text from a medication ingredient label.
Fix obvious recognition errors, broken lines and stray symbols without adding
or removing ingredients.

OCR text:
{ocr_text}

JSON format: {{"cleaned_text": "cleaned text"}}
Respond with valid JSON only."#
    )
}

/// Second OCR pass: ingredient names only, no amounts.
pub fn build_ocr_extraction_prompt(cleaned_text: &str) -> String {
    format!(
        r#"The following is text from a medication ingredient label.
Extract only the ingredient names as a JSON array. Each entry must be a bare
ingredient name without amount or unit information.

Text:
{cleaned_text}

JSON format: {{"ingredients": ["ingredient1", "ingredient2"]}}
Respond with valid JSON only."#
    )
}

fn push_bullets(prompt: &mut String, items: &[String]) {
    for item in items {
        let _ = writeln!(prompt, "- {item}");
    }
}

fn push_food_allergy_hints(prompt: &mut String, food_allergies: &[String], assessment: &RiskAssessment) {
    prompt.push_str("The user's food allergies:\n");
    push_bullets(prompt, food_allergies);
    prompt.push('\n');

    prompt.push_str("Rule-based food allergy screening (hints, may be incomplete):\n");
    if assessment.has_risk {
        let _ = writeln!(prompt, "- Risk level: {}", assessment.level);
        for m in assessment.matches.iter() {
            let _ = writeln!(prompt, "- {}: {}", m.category, m.ingredients.join(", "));
        }
    } else {
        prompt.push_str("- No food-origin excipients matched the user's food allergies.\n");
    }
    prompt.push_str(
        "Check these findings and report food-origin excipients in the food allergy fields.\n\n",
    );
}
