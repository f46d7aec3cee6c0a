//! Layered application configuration.
//!
//! Priority, lowest to highest: built-in defaults, YAML file, `MEDCHAT_`
//! environment variables (`__` separates sections, e.g.
//! `MEDCHAT_SERVER__PORT=8000`), explicit CLI flags.
//!
//! LLM provider settings are read separately by [`load_llm_settings`] so the
//! server can start without them and report the AI service as unavailable.

use std::path::Path;
use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::llm::provider::DEFAULT_AZURE_API_VERSION;
use crate::llm::{DEFAULT_TIMEOUT, LlmSettings, Provider};

/// Config file picked up from the working directory when none is given.
const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Base URL used when only `GEMINI_API_KEY` is configured.
const GEMINI_OPENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const GEMINI_DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Address to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Require JWT authentication
    #[arg(long, env = "JWT_REQUIRED")]
    pub jwt_required: Option<bool>,

    /// Enable rate limiting
    #[arg(long, env = "RATE_LIMIT_ENABLED")]
    pub rate_limit_enabled: Option<bool>,

    /// Disable timeout middleware
    #[arg(long, env = "TIMEOUT_DISABLED")]
    pub timeout_disabled: Option<bool>,

    /// Chat history file (JSON storage backend)
    #[arg(long, env = "CHAT_HISTORY_FILE")]
    pub history_file: Option<String>,

    /// Log output format (compact or json)
    #[arg(long, env = "LOG_FORMAT")]
    pub log_format: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub resilience: ResilienceConfig,
    pub storage: StorageConfig,
    pub conversation: ConversationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SecurityConfig {
    pub jwt_required: bool,
    #[serde(default)]
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    pub rate_limit_enabled: bool,
    pub timeout_disabled: bool,
    pub request_timeout_secs: u64,
    pub requests_per_second: f32,
    pub burst_size: f32,
}

impl ResilienceConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Where session history is kept.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// In-memory only; lost on restart.
    Memory,
    /// A single JSON history file.
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageKind,
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationConfig {
    /// Prior turns sent to the model as context.
    pub context_messages: usize,
    /// Overrides the built-in system prompt; an empty string disables it.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Overrides the wrapper around the newest user message
    /// (`{user_message}` placeholder); an empty string disables it.
    #[serde(default)]
    pub user_template: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("server.port", 8000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("security.jwt_required", false)?
            .set_default("security.jwt_secret", "")?
            .set_default("resilience.rate_limit_enabled", true)?
            .set_default("resilience.timeout_disabled", false)?
            .set_default("resilience.request_timeout_secs", 90)?
            .set_default("resilience.requests_per_second", 5.0)?
            .set_default("resilience.burst_size", 10.0)?
            .set_default("storage.backend", "json")?
            .set_default("storage.path", "chat_history.json")?
            .set_default(
                "conversation.context_messages",
                crate::llm::prompt::DEFAULT_CONTEXT_MESSAGES as u64,
            )?
            .set_default("logging.format", "compact")?;

        match &cli.config {
            Some(path) => builder = builder.add_source(File::with_name(path)),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE));
            }
            None => {}
        }

        builder = builder.add_source(
            Environment::with_prefix("MEDCHAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(required) = cli.jwt_required {
            builder = builder.set_override("security.jwt_required", required)?;
        }
        if let Some(rl) = cli.rate_limit_enabled {
            builder = builder.set_override("resilience.rate_limit_enabled", rl)?;
        }
        if let Some(td) = cli.timeout_disabled {
            builder = builder.set_override("resilience.timeout_disabled", td)?;
        }
        if let Some(path) = cli.history_file {
            builder = builder.set_override("storage.path", path)?;
        }
        if let Some(format) = cli.log_format {
            builder = builder.set_override("logging.format", format)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.security.jwt_required && self.security.jwt_secret.is_empty() {
            return Err(config::ConfigError::Message(
                "security.jwt_secret must be set when security.jwt_required is true".into(),
            ));
        }
        if self.resilience.requests_per_second <= 0.0 || self.resilience.burst_size < 1.0 {
            return Err(config::ConfigError::Message(
                "resilience.requests_per_second must be positive and burst_size at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Problems with the LLM environment variables.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LlmSettingsError {
    #[error("missing required env var: {0}")]
    Missing(&'static str),

    #[error("{0} cannot be empty")]
    Empty(&'static str),

    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Read LLM settings from the process environment.
pub fn load_llm_settings() -> Result<LlmSettings, LlmSettingsError> {
    llm_settings_from(|key| std::env::var(key).ok())
}

/// Read LLM settings through an arbitrary variable lookup.
pub fn llm_settings_from<F>(lookup: F) -> Result<LlmSettings, LlmSettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

    let gemini_key = non_empty("GEMINI_API_KEY");

    let base_url = match (lookup("LLM_BASE_URL"), &gemini_key) {
        (Some(url), _) if url.trim().is_empty() => {
            return Err(LlmSettingsError::Empty("LLM_BASE_URL"));
        }
        (Some(url), _) => url,
        (None, Some(_)) => GEMINI_OPENAI_BASE_URL.to_string(),
        (None, None) => return Err(LlmSettingsError::Missing("LLM_BASE_URL")),
    };

    let mut provider = Provider::detect_from_url(&base_url);

    let model = match lookup("LLM_MODEL") {
        Some(m) if m.trim().is_empty() => return Err(LlmSettingsError::Empty("LLM_MODEL")),
        Some(m) => m,
        None if provider == Provider::Gemini => GEMINI_DEFAULT_MODEL.to_string(),
        None => return Err(LlmSettingsError::Missing("LLM_MODEL")),
    };

    let api_key = non_empty("LLM_API_KEY").or(gemini_key);

    if let Provider::AzureOpenAI { .. } = provider {
        let deployment_name =
            non_empty("AZURE_DEPLOYMENT_NAME").ok_or(LlmSettingsError::Missing("AZURE_DEPLOYMENT_NAME"))?;
        provider = Provider::AzureOpenAI {
            deployment_name,
            api_version: non_empty("AZURE_API_VERSION")
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
        };
    }

    let temperature = match non_empty("LLM_TEMPERATURE") {
        Some(raw) => Some(raw.trim().parse::<f32>().map_err(|_parse| {
            LlmSettingsError::Invalid {
                var: "LLM_TEMPERATURE",
                value: raw.clone(),
            }
        })?),
        None => Some(DEFAULT_TEMPERATURE),
    };

    let timeout = match non_empty("LLM_TIMEOUT_SECS") {
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                return Err(LlmSettingsError::Invalid {
                    var: "LLM_TIMEOUT_SECS",
                    value: raw,
                });
            }
        },
        None => DEFAULT_TIMEOUT,
    };

    Ok(LlmSettings {
        base_url,
        api_key,
        model,
        provider,
        temperature,
        timeout,
    })
}
