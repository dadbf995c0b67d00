use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::assessment::exercises::{RecommendationConfig, DEFAULT_AWARENESS_THRESHOLD};
use crate::assessment::measurement::default_program;
use crate::llm_client::{gemini, openai};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    OpenAi,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "openai" => Ok(ProviderKind::OpenAi),
            other => bail!("unknown AI provider '{other}', expected 'gemini' or 'openai'"),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Credentials are optional here; the selected provider checks for its own key.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderKind,
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub gemini_model: String,
    pub openai_model: String,
    pub output_dir: PathBuf,
    pub prompt_file: Option<PathBuf>,
    pub hybrid_prompt_file: Option<PathBuf>,
    pub template_file: Option<PathBuf>,
    pub extractor_program: String,
    pub extractor_script: String,
    pub extractor_timeout: Duration,
    pub provider_timeout: Duration,
    pub awareness_threshold: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Config {
            provider: get("AI_PROVIDER")
                .map(|v| v.parse())
                .transpose()
                .context("AI_PROVIDER is invalid")?
                .unwrap_or(ProviderKind::Gemini),
            gemini_api_key: get("GOOGLE_API_KEY").or_else(|| get("GEMINI_API_KEY")),
            openai_api_key: get("OPENAI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| gemini::DEFAULT_MODEL.to_string()),
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| openai::DEFAULT_MODEL.to_string()),
            output_dir: get("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("output")),
            prompt_file: get("PROMPT_FILE").map(PathBuf::from),
            hybrid_prompt_file: get("HYBRID_PROMPT_FILE").map(PathBuf::from),
            template_file: get("TEMPLATE_FILE").map(PathBuf::from),
            extractor_program: get("EXTRACTOR_PROGRAM").unwrap_or_else(default_program),
            extractor_script: get("EXTRACTOR_SCRIPT")
                .unwrap_or_else(|| "pose_extractor.py".to_string()),
            extractor_timeout: Duration::from_secs(parse_or(
                get("EXTRACTOR_TIMEOUT_SECS"),
                300,
                "EXTRACTOR_TIMEOUT_SECS must be a whole number of seconds",
            )?),
            provider_timeout: Duration::from_secs(parse_or(
                get("PROVIDER_TIMEOUT_SECS"),
                600,
                "PROVIDER_TIMEOUT_SECS must be a whole number of seconds",
            )?),
            awareness_threshold: parse_or(
                get("AWARENESS_EXERCISE_THRESHOLD"),
                DEFAULT_AWARENESS_THRESHOLD,
                "AWARENESS_EXERCISE_THRESHOLD must be a non-negative integer",
            )?,
            port: parse_or(get("PORT"), 8080, "PORT must be a valid port number")?,
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn recommendations(&self) -> RecommendationConfig {
        RecommendationConfig {
            awareness_threshold: self.awareness_threshold,
        }
    }

    pub fn active_model(&self) -> &str {
        match self.provider {
            ProviderKind::Gemini => &self.gemini_model,
            ProviderKind::OpenAi => &self.openai_model,
        }
    }

    /// Overrides the model of the selected provider.
    pub fn set_model(&mut self, model: String) {
        match self.provider {
            ProviderKind::Gemini => self.gemini_model = model,
            ProviderKind::OpenAi => self.openai_model = model,
        }
    }
}

fn parse_or<T>(value: Option<String>, default: T, message: &'static str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v.trim().parse::<T>().context(message),
        None => Ok(default),
    }
}
