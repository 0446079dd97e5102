use std::io::Read;
use std::process::ExitCode;

use thiserror::Error;

use medcheck_lib::analysis::{
    AnalysisError, AnalysisOrchestrator, AnalysisRequest, ChatCompletionClient, ServiceError,
};
use medcheck_lib::config::{self, ClassifierConfig, ConfigError};

#[derive(Error, Debug)]
enum CliError {
    #[error("Failed to read stdin: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

fn main() -> ExitCode {
    medcheck_lib::init_tracing();
    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);

    match run() {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Request failed");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<String, CliError> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;

    let config = ClassifierConfig::from_env()?;
    let client = ChatCompletionClient::new(config)?;
    let orchestrator = AnalysisOrchestrator::new(Box::new(client));

    handle(&input, &orchestrator)
}

/// Dispatch one tagged request and render the result as pretty JSON.
fn handle(input: &str, orchestrator: &AnalysisOrchestrator) -> Result<String, CliError> {
    let request: AnalysisRequest = serde_json::from_str(input)?;

    let output = match request {
        AnalysisRequest::Ingredients(req) => {
            serde_json::to_string_pretty(&orchestrator.analyze_ingredients(&req)?)?
        }
        AnalysisRequest::SideEffects(req) => {
            serde_json::to_string_pretty(&orchestrator.analyze_side_effects(&req)?)?
        }
        AnalysisRequest::Ocr(req) => serde_json::to_string_pretty(&orchestrator.normalize_ocr(&req))?,
    };

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use medcheck_lib::analysis::MockClassificationClient;
    use serde_json::{json, Value};

    fn orchestrator(replies: Vec<Result<Value, ServiceError>>) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(Box::new(MockClassificationClient::new(replies)))
    }

    #[test]
    fn invalid_request_is_json_error() {
        let err = handle(r#"{"kind": "unknown"}"#, &orchestrator(vec![])).unwrap_err();
        assert!(matches!(err, CliError::Json(_)));
    }

    #[test]
    fn ocr_request_renders_result() {
        let output = handle(r#"{"kind": "ocr", "ocr_text": "  "}"#, &orchestrator(vec![])).unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value, json!({"normalized_ingredients": [], "cleaned_text": ""}));
    }

    #[test]
    fn service_failure_is_analysis_error() {
        let err = handle(
            r#"{"kind": "ingredients", "ingredients": ["Talc"]}"#,
            &orchestrator(vec![Err(ServiceError::Timeout(60))]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CliError::Analysis(AnalysisError::Service { source: ServiceError::Timeout(60), .. })
        ));
        assert!(err.to_string().contains("timed out after 60s"));
    }
}
