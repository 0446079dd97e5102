use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ServiceError;
use crate::config::ClassifierConfig;

/// System message sent with every instruction.
pub const SYSTEM_PROMPT: &str =
    "You are a medical assistant. Always respond in valid JSON format only.";

/// The external classification collaborator.
///
/// One call per instruction, no retries. Every failure (transport, timeout,
/// non-success status, unparseable content) is a [`ServiceError`].
pub trait ClassificationClient {
    fn invoke(&self, instruction: &str) -> Result<Map<String, Value>, ServiceError>;
}

impl<C: ClassificationClient + ?Sized> ClassificationClient for Arc<C> {
    fn invoke(&self, instruction: &str) -> Result<Map<String, Value>, ServiceError> {
        (**self).invoke(instruction)
    }
}

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct ChatCompletionClient {
    config: ClassifierConfig,
    client: reqwest::blocking::Client,
}

impl ChatCompletionClient {
    pub fn new(config: ClassifierConfig) -> Result<Self, ServiceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::HttpClient(e.to_string()))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }
}

/// Request body for the chat completions endpoint.
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Response body from the chat completions endpoint.
#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl ClassificationClient for ChatCompletionClient {
    fn invoke(&self, instruction: &str) -> Result<Map<String, Value>, ServiceError> {
        if self.config.api_key.is_empty() {
            return Err(ServiceError::NotConfigured);
        }

        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: instruction,
                },
            ],
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::Timeout(self.config.timeout_secs)
                } else if e.is_connect() {
                    ServiceError::Connection(self.config.api_url.clone())
                } else {
                    ServiceError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| ServiceError::MalformedResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ServiceError::MalformedResponse("Response has no choices".into()))?;

        parse_json_object(&content)
    }
}

/// Parse completion content as a single JSON object. A surrounding ```json
/// fence is tolerated.
pub fn parse_json_object(content: &str) -> Result<Map<String, Value>, ServiceError> {
    let trimmed = strip_code_fence(content.trim());
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ServiceError::JsonParsing(format!(
            "expected a JSON object, got {}",
            match other {
                Value::Array(_) => "an array",
                Value::String(_) => "a string",
                Value::Null => "null",
                _ => "a scalar",
            }
        ))),
        Err(e) => Err(ServiceError::JsonParsing(e.to_string())),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Mock collaborator for testing: replays scripted replies in order and
/// records every instruction it receives.
pub struct MockClassificationClient {
    replies: Mutex<VecDeque<Result<Value, ServiceError>>>,
    instructions: Mutex<Vec<String>>,
}

impl MockClassificationClient {
    pub fn new(replies: Vec<Result<Value, ServiceError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            instructions: Mutex::new(Vec::new()),
        }
    }

    /// A mock with a single scripted reply.
    pub fn replying(reply: Value) -> Self {
        Self::new(vec![Ok(reply)])
    }

    pub fn failing(error: ServiceError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Instructions received so far, in call order.
    pub fn instructions(&self) -> Vec<String> {
        self.instructions
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.instructions().len()
    }
}

impl ClassificationClient for MockClassificationClient {
    fn invoke(&self, instruction: &str) -> Result<Map<String, Value>, ServiceError> {
        if let Ok(mut seen) = self.instructions.lock() {
            seen.push(instruction.to_string());
        }

        let reply = self
            .replies
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| Err(ServiceError::MalformedResponse("No scripted reply".into())))?;

        match reply {
            Value::Object(map) => Ok(map),
            other => parse_json_object(&other.to_string()),
        }
    }
}
