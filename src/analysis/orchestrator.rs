use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use super::client::ClassificationClient;
use super::completion::{complete_result, discard_unusable_fields};
use super::prompt::{
    build_ingredient_prompt, build_ocr_cleanup_prompt, build_ocr_extraction_prompt,
    build_side_effect_prompt,
};
use super::request::{IngredientAnalysisRequest, OcrNormalizeRequest, SideEffectAnalysisRequest};
use super::schema::{
    validate_result, AnalysisSchema, IngredientAnalysisResult, OcrNormalizationResult,
    SideEffectAnalysisResult,
};
use super::{AnalysisError, AnalysisKind};
use crate::allergen::{AllergenTriggerRegistry, RiskAssessment, RiskScorer};
use crate::ingredients::{extract_ingredients, reduce_common};

/// Runs each analysis request through the pipeline:
/// deterministic scoring → prompt → collaborator → completion → validation.
///
/// Holds no per-request state, so one instance can serve concurrent callers.
pub struct AnalysisOrchestrator {
    client: Box<dyn ClassificationClient + Send + Sync>,
    registry: Arc<AllergenTriggerRegistry>,
}

impl AnalysisOrchestrator {
    /// Orchestrator over the built-in allergen registry.
    pub fn new(client: Box<dyn ClassificationClient + Send + Sync>) -> Self {
        Self::with_registry(client, AllergenTriggerRegistry::builtin())
    }

    pub fn with_registry(
        client: Box<dyn ClassificationClient + Send + Sync>,
        registry: Arc<AllergenTriggerRegistry>,
    ) -> Self {
        Self { client, registry }
    }

    pub fn registry(&self) -> &AllergenTriggerRegistry {
        &self.registry
    }

    /// Deterministic food-allergy assessment. Never fails.
    pub fn assess_food_allergy<A, I>(&self, food_allergies: &[A], ingredients: &[I]) -> RiskAssessment
    where
        A: AsRef<str>,
        I: AsRef<str>,
    {
        RiskScorer::new(&self.registry).score(food_allergies, ingredients)
    }

    pub fn analyze_ingredients(
        &self,
        request: &IngredientAnalysisRequest,
    ) -> Result<IngredientAnalysisResult, AnalysisError> {
        let request_id = Uuid::new_v4();
        let _span = tracing::info_span!(
            "analyze_ingredients",
            %request_id,
            ingredients = request.ingredients.len()
        )
        .entered();

        let assessment = self.assess_food_allergy(&request.food_allergies, &request.ingredients);
        let prompt = build_ingredient_prompt(request, &assessment);
        let raw = self.call(AnalysisKind::IngredientRisk, &prompt)?;
        let result: IngredientAnalysisResult = finish(raw, &assessment)?;

        tracing::info!(
            safety_level = ?result.safety_level,
            food_allergy_risk = assessment.has_risk,
            "Ingredient analysis complete"
        );
        Ok(result)
    }

    pub fn analyze_side_effects(
        &self,
        request: &SideEffectAnalysisRequest,
    ) -> Result<SideEffectAnalysisResult, AnalysisError> {
        let request_id = Uuid::new_v4();
        let _span = tracing::info_span!(
            "analyze_side_effects",
            %request_id,
            medications = request.medication_ingredients.len()
        )
        .entered();

        let common = reduce_common(&request.medication_ingredients);
        let all_ingredients = request.all_ingredients();
        let assessment = self.assess_food_allergy(&request.food_allergies, &all_ingredients);
        tracing::debug!(common = common.len(), "Computed common ingredients");

        let prompt = build_side_effect_prompt(request, &common, &assessment);
        let raw = self.call(AnalysisKind::SideEffect, &prompt)?;
        let result: SideEffectAnalysisResult = finish(raw, &assessment)?;

        tracing::info!(
            sensitive = result.user_sensitive_ingredients.len(),
            food_allergy_risk = assessment.has_risk,
            "Side-effect analysis complete"
        );
        Ok(result)
    }

    /// Clean OCR text and extract ingredient names.
    ///
    /// Collaborator failures never surface here: a failed cleanup keeps the
    /// trimmed raw text, and a failed or empty extraction falls back to
    /// [`extract_ingredients`] on the cleaned text.
    pub fn normalize_ocr(&self, request: &OcrNormalizeRequest) -> OcrNormalizationResult {
        let request_id = Uuid::new_v4();
        let _span = tracing::info_span!(
            "normalize_ocr",
            %request_id,
            chars = request.ocr_text.chars().count()
        )
        .entered();

        let raw_text = request.ocr_text.trim();
        if raw_text.is_empty() {
            return OcrNormalizationResult::default();
        }

        let cleaned_text = match self
            .call(AnalysisKind::OcrCleanup, &build_ocr_cleanup_prompt(raw_text))
            .and_then(cleaned_text_from)
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "OCR cleanup failed, using raw text");
                raw_text.to_string()
            }
        };

        let extracted = self
            .call(
                AnalysisKind::OcrExtraction,
                &build_ocr_extraction_prompt(&cleaned_text),
            )
            .and_then(ingredients_from);

        match extracted {
            Ok(normalized_ingredients) if !normalized_ingredients.is_empty() => {
                OcrNormalizationResult {
                    normalized_ingredients,
                    cleaned_text,
                    used_fallback: false,
                }
            }
            other => {
                match other {
                    Err(e) => tracing::warn!(error = %e, "OCR extraction failed, using local split"),
                    Ok(_) => tracing::warn!("OCR extraction returned no ingredients, using local split"),
                }
                OcrNormalizationResult {
                    normalized_ingredients: extract_ingredients(&cleaned_text),
                    cleaned_text,
                    used_fallback: true,
                }
            }
        }
    }

    /// One collaborator invocation. No retries.
    fn call(&self, kind: AnalysisKind, prompt: &str) -> Result<Map<String, Value>, AnalysisError> {
        tracing::debug!(kind = %kind, prompt_chars = prompt.len(), "Calling classification service");

        match self.client.invoke(prompt) {
            Ok(reply) => {
                tracing::debug!(kind = %kind, fields = reply.len(), "Classification service replied");
                Ok(reply)
            }
            Err(source) => {
                tracing::error!(kind = %kind, error = %source, "Classification service call failed");
                Err(AnalysisError::Service { kind, source })
            }
        }
    }
}

fn finish<T: AnalysisSchema>(
    mut raw: Map<String, Value>,
    assessment: &RiskAssessment,
) -> Result<T, AnalysisError> {
    discard_unusable_fields(&mut raw, T::KIND);
    complete_result(&mut raw, T::KIND, assessment);
    validate_result(raw).inspect_err(|e| {
        tracing::warn!(kind = %T::KIND, error = %e, "Classification result rejected");
    })
}

fn cleaned_text_from(mut reply: Map<String, Value>) -> Result<String, AnalysisError> {
    match reply.remove("cleaned_text") {
        Some(Value::String(text)) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        _ => Err(AnalysisError::SchemaViolation {
            kind: AnalysisKind::OcrCleanup,
            field: "cleaned_text",
        }),
    }
}

fn ingredients_from(mut reply: Map<String, Value>) -> Result<Vec<String>, AnalysisError> {
    let Some(Value::Array(items)) = reply.remove("ingredients") else {
        return Err(AnalysisError::MalformedResult {
            kind: AnalysisKind::OcrExtraction,
            detail: "`ingredients` is not an array".into(),
        });
    };

    Ok(items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allergen::RiskLevel;
    use crate::analysis::client::MockClassificationClient;
    use crate::analysis::schema::SafetyLevel;
    use crate::analysis::ServiceError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingClient {
        calls: AtomicUsize,
    }

    impl FailingClient {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ClassificationClient for FailingClient {
        fn invoke(&self, _instruction: &str) -> Result<Map<String, Value>, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::Timeout(60))
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn ingredient_reply() -> Value {
        json!({
            "safety_level": "CAUTION",
            "ingredient_risks": [
                {"ingredient_name": "peanut oil", "risk_level": "HIGH", "reason": "peanut allergy"}
            ],
            "expected_side_effects": ["rash"],
            "overall_assessment": "Contains peanut-derived excipients.",
            "recommendations": ["Consult a pharmacist"]
        })
    }

    fn side_effect_reply() -> Value {
        json!({
            "common_ingredients": ["C"],
            "user_sensitive_ingredients": [],
            "common_side_effect_ingredients": [],
            "summary": "C is shared by every medication."
        })
    }

    fn orchestrator_with(mock: &Arc<MockClassificationClient>) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(Box::new(Arc::clone(mock)))
    }

    fn ingredient_request() -> IngredientAnalysisRequest {
        IngredientAnalysisRequest {
            ingredients: strings(&["peanut oil", "egg albumin", "starch"]),
            allergy_ingredients: strings(&["penicillin"]),
            food_allergies: strings(&["peanut", "egg"]),
        }
    }

    #[test]
    fn ingredient_analysis_completes_food_allergy_fields() {
        let mock = Arc::new(MockClassificationClient::replying(ingredient_reply()));
        let orchestrator = orchestrator_with(&mock);

        let result = orchestrator.analyze_ingredients(&ingredient_request()).unwrap();

        assert_eq!(result.safety_level, SafetyLevel::Caution);
        assert_eq!(result.food_allergy_risk, Some(RiskLevel::Medium));
        assert_eq!(result.matched_food_allergens, Some(strings(&["peanut", "egg"])));
        assert_eq!(
            result.food_origin_excipients_detected,
            Some(strings(&["peanut oil", "egg albumin"]))
        );
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn instruction_carries_deterministic_hints() {
        let mock = Arc::new(MockClassificationClient::replying(ingredient_reply()));
        orchestrator_with(&mock)
            .analyze_ingredients(&ingredient_request())
            .unwrap();

        let instructions = mock.instructions();
        assert!(instructions[0].contains("- Risk level: MEDIUM"));
        assert!(instructions[0].contains("- peanut: peanut oil"));
        assert!(instructions[0].contains("- penicillin"));
    }

    #[test]
    fn collaborator_values_are_kept() {
        let mut reply = ingredient_reply();
        reply["food_allergy_risk"] = json!("HIGH");
        let mock = Arc::new(MockClassificationClient::replying(reply));

        let result = orchestrator_with(&mock)
            .analyze_ingredients(&ingredient_request())
            .unwrap();

        assert_eq!(result.food_allergy_risk, Some(RiskLevel::High));
        assert_eq!(result.matched_food_allergens, Some(strings(&["peanut", "egg"])));
    }

    #[test]
    fn no_food_risk_leaves_optional_fields_absent() {
        let mock = Arc::new(MockClassificationClient::replying(ingredient_reply()));
        let request = IngredientAnalysisRequest {
            ingredients: strings(&["starch", "talc"]),
            allergy_ingredients: vec![],
            food_allergies: strings(&["sesame"]),
        };

        let result = orchestrator_with(&mock).analyze_ingredients(&request).unwrap();

        assert!(result.food_allergy_risk.is_none());
        assert!(result.matched_food_allergens.is_none());
        assert!(result.food_origin_excipients_detected.is_none());
    }

    #[test]
    fn malformed_optional_fields_do_not_fail_the_request() {
        let request = IngredientAnalysisRequest {
            ingredients: strings(&["starch"]),
            allergy_ingredients: vec![],
            food_allergies: strings(&["sesame"]),
        };

        for (field, value) in [
            ("food_allergy_risk", json!("")),
            ("food_allergy_risk", json!("NONE")),
            ("matched_food_allergens", json!("")),
        ] {
            let mut reply = ingredient_reply();
            reply[field] = value;
            let mock = Arc::new(MockClassificationClient::replying(reply));

            let result = orchestrator_with(&mock).analyze_ingredients(&request).unwrap();

            assert_eq!(result.safety_level, SafetyLevel::Caution);
            assert!(result.food_allergy_risk.is_none());
            assert!(result.matched_food_allergens.is_none());
        }
    }

    #[test]
    fn malformed_optional_field_is_replaced_when_risk_found() {
        let mut reply = ingredient_reply();
        reply["food_allergy_risk"] = json!("NONE");
        let mock = Arc::new(MockClassificationClient::replying(reply));

        let result = orchestrator_with(&mock)
            .analyze_ingredients(&ingredient_request())
            .unwrap();

        assert_eq!(result.food_allergy_risk, Some(RiskLevel::Medium));
    }

    #[test]
    fn service_error_is_fatal_for_ingredient_analysis() {
        let client = Arc::new(FailingClient::new());
        let orchestrator = AnalysisOrchestrator::new(Box::new(Arc::clone(&client)));

        let err = orchestrator.analyze_ingredients(&ingredient_request()).unwrap_err();

        assert!(matches!(
            err,
            AnalysisError::Service {
                kind: AnalysisKind::IngredientRisk,
                source: ServiceError::Timeout(60)
            }
        ));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_mandatory_field_is_schema_violation() {
        let mut reply = ingredient_reply();
        reply.as_object_mut().unwrap().remove("recommendations");
        let mock = Arc::new(MockClassificationClient::replying(reply));

        let err = orchestrator_with(&mock)
            .analyze_ingredients(&ingredient_request())
            .unwrap_err();

        assert!(matches!(
            err,
            AnalysisError::SchemaViolation {
                kind: AnalysisKind::IngredientRisk,
                field: "recommendations"
            }
        ));
    }

    #[test]
    fn side_effect_analysis_uses_common_ingredients() {
        let mock = Arc::new(MockClassificationClient::replying(side_effect_reply()));
        let request = SideEffectAnalysisRequest {
            medication_names: strings(&["One", "Two", "Three"]),
            medication_ingredients: vec![
                strings(&["A", "B", "C"]),
                strings(&["B", "C", "D"]),
                strings(&["C", "D", "E"]),
            ],
            ..Default::default()
        };

        let result = orchestrator_with(&mock).analyze_side_effects(&request).unwrap();

        assert_eq!(result.common_ingredients, vec!["C"]);
        assert!(result.food_allergy_analysis.is_none());
        assert!(mock.instructions()[0].contains("Common ingredients: C"));
    }

    #[test]
    fn side_effect_scoring_spans_all_groups() {
        let mock = Arc::new(MockClassificationClient::replying(side_effect_reply()));
        let request = SideEffectAnalysisRequest {
            medication_names: strings(&["Capsule", "Tablet"]),
            medication_ingredients: vec![
                strings(&["gelatin capsule", "starch"]),
                strings(&["lactose monohydrate", "starch"]),
            ],
            food_allergies: strings(&["gelatin", "lactose"]),
            ..Default::default()
        };

        let result = orchestrator_with(&mock).analyze_side_effects(&request).unwrap();

        assert_eq!(result.food_allergy_risk, Some(RiskLevel::Medium));
        let composite = result.food_allergy_analysis.unwrap();
        assert_eq!(
            composite.matched_allergens.get("gelatin"),
            Some(&["gelatin capsule".to_string()][..])
        );
        assert_eq!(
            composite.matched_allergens.get("lactose"),
            Some(&["lactose monohydrate".to_string()][..])
        );
        assert!(composite.risk_assessment.starts_with("Food-allergy related excipients detected."));
    }

    #[test]
    fn composite_keeps_allergy_list_order() {
        let mock = Arc::new(MockClassificationClient::replying(side_effect_reply()));
        let request = SideEffectAnalysisRequest {
            medication_names: strings(&["One", "Two"]),
            medication_ingredients: vec![
                strings(&["soy lecithin", "starch"]),
                strings(&["peanut oil", "starch"]),
            ],
            food_allergies: strings(&["soy", "peanut"]),
            ..Default::default()
        };

        let result = orchestrator_with(&mock).analyze_side_effects(&request).unwrap();

        assert_eq!(result.matched_food_allergens, Some(strings(&["soy", "peanut"])));
        let composite = result.food_allergy_analysis.unwrap();
        assert_eq!(composite.matched_allergens.categories(), strings(&["soy", "peanut"]));
    }

    #[test]
    fn ocr_uses_collaborator_tokens() {
        let mock = Arc::new(MockClassificationClient::new(vec![
            Ok(json!({"cleaned_text": "Acetaminophen 500mg, Starch"})),
            Ok(json!({"ingredients": [" Acetaminophen ", "", "Starch"]})),
        ]));

        let result = orchestrator_with(&mock).normalize_ocr(&OcrNormalizeRequest {
            ocr_text: "Acetaminoph en 500mg,, Starch".into(),
        });

        assert_eq!(result.normalized_ingredients, vec!["Acetaminophen", "Starch"]);
        assert_eq!(result.cleaned_text, "Acetaminophen 500mg, Starch");
        assert!(!result.used_fallback);
        let instructions = mock.instructions();
        assert_eq!(instructions.len(), 2);
        assert!(instructions[1].contains("Acetaminophen 500mg, Starch"));
    }

    #[test]
    fn ocr_falls_back_when_collaborator_fails() {
        let client = Arc::new(FailingClient::new());
        let orchestrator = AnalysisOrchestrator::new(Box::new(Arc::clone(&client)));

        let result = orchestrator.normalize_ocr(&OcrNormalizeRequest {
            ocr_text: "  Acetaminophen, Caffeine\nStarch ,, ".into(),
        });

        assert_eq!(result.normalized_ingredients, vec!["Acetaminophen", "Caffeine", "Starch"]);
        assert_eq!(result.cleaned_text, "Acetaminophen, Caffeine\nStarch ,,");
        assert!(result.used_fallback);
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn ocr_falls_back_on_empty_or_malformed_extraction() {
        for extraction in [json!({"ingredients": []}), json!({"ingredients": "Talc"})] {
            let mock = Arc::new(MockClassificationClient::new(vec![
                Ok(json!({"cleaned_text": "Talc, Starch"})),
                Ok(extraction),
            ]));
            let result = orchestrator_with(&mock).normalize_ocr(&OcrNormalizeRequest {
                ocr_text: "Talc, Starch".into(),
            });
            assert_eq!(result.normalized_ingredients, vec!["Talc", "Starch"]);
            assert!(result.used_fallback);
        }
    }

    #[test]
    fn blank_ocr_text_makes_no_call() {
        let mock = Arc::new(MockClassificationClient::new(vec![]));
        let result = orchestrator_with(&mock).normalize_ocr(&OcrNormalizeRequest {
            ocr_text: " \n\t ".into(),
        });

        assert_eq!(result, OcrNormalizationResult::default());
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn orchestrator_is_shared_across_threads() {
        let replies = (0..4).map(|_| Ok(ingredient_reply())).collect();
        let mock = Arc::new(MockClassificationClient::new(replies));
        let orchestrator = orchestrator_with(&mock);
        let request = ingredient_request();

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| orchestrator.analyze_ingredients(&request)))
                .collect();
            for handle in handles {
                let result = handle.join().unwrap().unwrap();
                assert_eq!(result.food_allergy_risk, Some(RiskLevel::Medium));
            }
        });

        assert_eq!(mock.call_count(), 4);
    }

    #[test]
    fn assessment_is_deterministic() {
        let mock = Arc::new(MockClassificationClient::new(vec![]));
        let orchestrator = orchestrator_with(&mock);
        let first = orchestrator.assess_food_allergy(&["milk"], &["casein", "whey"]);
        let second = orchestrator.assess_food_allergy(&["milk"], &["casein", "whey"]);
        assert_eq!(first, second);
        assert_eq!(orchestrator.registry().categories().count(), 10);
    }
}
