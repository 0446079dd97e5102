use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "medcheck";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Upper bound for a single collaborator call.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TEMPERATURE: f64 = 0.3;

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "info,medcheck_lib=debug"
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Settings for the classification collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub api_url: String,
    /// Empty when not configured; the client reports this at call time.
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl ClassifierConfig {
    /// Read `OPENAI_API_KEY`, `OPENAI_API_URL`, `GPT_MODEL` and
    /// `MEDCHECK_TIMEOUT_SECS` from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source. Unset or blank variables keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(key) = get("OPENAI_API_KEY") {
            config.api_key = key.trim().to_string();
        }
        if let Some(url) = get("OPENAI_API_URL") {
            config.api_url = url.trim().to_string();
        }
        if let Some(model) = get("GPT_MODEL") {
            config.model = model.trim().to_string();
        }
        if let Some(raw) = get("MEDCHECK_TIMEOUT_SECS") {
            config.timeout_secs = parse_timeout(&raw)?;
        }

        Ok(config)
    }
}

fn parse_timeout(raw: &str) -> Result<u64, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        var: "MEDCHECK_TIMEOUT_SECS",
        value: raw.to_string(),
        reason,
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(invalid("must be greater than zero".into())),
        Ok(secs) => Ok(secs),
        Err(e) => Err(invalid(e.to_string())),
    }
}
