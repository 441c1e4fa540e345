use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;
use tutor_core::config::{ReviewStrategy, SessionConfig, SessionTargets, TargetOverrides};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Supported OpenAI-compatible dialogue backends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Gemini,
}

impl Provider {
    pub fn api_base(&self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1/",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// When absent, assessment sets are cached in memory only.
    pub database_url: Option<String>,
    pub provider: Provider,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub chat_model: String,
    pub speech_enabled: bool,
    pub speech_model: String,
    pub speech_voice: String,
    pub log_level: Level,
    pub lessons_path: PathBuf,
    pub prompts_path: PathBuf,
    pub targets: SessionTargets,
    pub review_strategy: ReviewStrategy,
    pub dialogue_timeout: Duration,
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let provider_str =
            std::env::var("DIALOGUE_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "gemini" => Provider::Gemini,
            _ => Provider::OpenAI,
        };

        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let gemini_api_key = std::env::var("GEMINI_API_KEY").ok();

        let chat_model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let speech_enabled = parse_var("SPEECH_ENABLED", true)?;
        let speech_model = std::env::var("SPEECH_MODEL").unwrap_or_else(|_| "tts-1".to_string());
        let speech_voice = std::env::var("SPEECH_VOICE").unwrap_or_else(|_| "nova".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let lessons_path = std::env::var("LESSONS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./lessons"));
        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts"));

        let defaults = SessionTargets::default();
        let targets = SessionTargets::default().with_overrides(&TargetOverrides {
            comprehension: Some(parse_var("COMPREHENSION_TARGET", defaults.comprehension)?),
            exercise: Some(parse_var("EXERCISE_TARGET", defaults.exercise)?),
            worksheet_length: Some(parse_var("WORKSHEET_LENGTH", defaults.worksheet_length)?),
            test_length: Some(parse_var("TEST_LENGTH", defaults.test_length)?),
        });
        let review_strategy = parse_var("REVIEW_STRATEGY", ReviewStrategy::default())?;
        let dialogue_timeout =
            Duration::from_secs(parse_var("DIALOGUE_TIMEOUT_SECS", 25u64)?.max(1));

        match provider {
            Provider::OpenAI => {
                if openai_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "OPENAI_API_KEY must be set for 'openai' provider".to_string(),
                    ));
                }
            }
            Provider::Gemini => {
                if gemini_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "GEMINI_API_KEY must be set for 'gemini' provider".to_string(),
                    ));
                }
            }
        }

        Ok(Self {
            bind_address,
            database_url,
            provider,
            openai_api_key,
            gemini_api_key,
            chat_model,
            speech_enabled,
            speech_model,
            speech_voice,
            log_level,
            lessons_path,
            prompts_path,
            targets,
            review_strategy,
            dialogue_timeout,
        })
    }

    /// The API key for the selected provider.
    pub fn api_key(&self) -> Option<&str> {
        match self.provider {
            Provider::OpenAI => self.openai_api_key.as_deref(),
            Provider::Gemini => self.gemini_api_key.as_deref(),
        }
    }

    /// Deployment defaults with a learner's per-session overrides applied.
    pub fn session_config(&self, overrides: &TargetOverrides) -> SessionConfig {
        SessionConfig {
            targets: self.targets,
            review_strategy: self.review_strategy,
            dialogue_timeout: self.dialogue_timeout,
            ..SessionConfig::default()
        }
        .with_overrides(overrides)
    }
}
