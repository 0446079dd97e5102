pub mod client;
pub mod completion;
pub mod orchestrator;
pub mod prompt;
pub mod request;
pub mod schema;

pub use client::*;
pub use completion::*;
pub use orchestrator::*;
pub use prompt::*;
pub use request::*;
pub use schema::*;

use thiserror::Error;

/// Which structured result the collaborator is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisKind {
    IngredientRisk,
    SideEffect,
    OcrCleanup,
    OcrExtraction,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IngredientRisk => "ingredient_risk",
            Self::SideEffect => "side_effect",
            Self::OcrCleanup => "ocr_cleanup",
            Self::OcrExtraction => "ocr_extraction",
        }
    }
}

impl std::fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single collaborator invocation.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Classification service API key is not configured")]
    NotConfigured,

    #[error("Classification service is unreachable at {0}")]
    Connection(String),

    #[error("Classification service timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Classification service returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("Malformed classification response: {0}")]
    MalformedResponse(String),

    #[error("Classification content is not valid JSON: {0}")]
    JsonParsing(String),
}

/// Failure of a whole analysis request.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Classification failed for {kind}: {source}")]
    Service {
        kind: AnalysisKind,
        #[source]
        source: ServiceError,
    },

    #[error("{kind} result is missing required field `{field}`")]
    SchemaViolation { kind: AnalysisKind, field: &'static str },

    #[error("{kind} result does not match its schema: {detail}")]
    MalformedResult { kind: AnalysisKind, detail: String },
}
