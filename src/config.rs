//! Process configuration
//!
//! Loaded once at startup from the environment (a `.env` file is honored).
//! No hot reload.

use crate::agents::market::DEFAULT_ALPHA_VANTAGE_URL;
use crate::agents::retriever::DEFAULT_TOP_K;
use crate::audio::DEFAULT_AUDIO_RETENTION;
use crate::error::OrchestrationError;
use crate::gate::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::gemini::DEFAULT_GEMINI_MODEL;
use crate::retry::RetryPolicy;
use crate::Result;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Minimum retrieval confidence for the gate, in [0, 1]
    pub confidence_threshold: f64,
    /// Synthesize speech for every response, not only voice requests
    pub voice_output_enabled: bool,
    pub retrieval_top_k: usize,
    pub retry: RetryPolicy,
    pub audio_retention: Duration,
    pub alpha_vantage_api_key: String,
    pub alpha_vantage_base_url: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub stt_endpoint: Option<String>,
    pub tts_endpoint: Option<String>,
    pub corpus_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            voice_output_enabled: false,
            retrieval_top_k: DEFAULT_TOP_K,
            retry: RetryPolicy::default(),
            audio_retention: DEFAULT_AUDIO_RETENTION,
            alpha_vantage_api_key: String::new(),
            alpha_vantage_base_url: DEFAULT_ALPHA_VANTAGE_URL.to_string(),
            gemini_api_key: String::new(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            stt_endpoint: None,
            tts_endpoint: None,
            corpus_path: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => parse::<u16>("PORT", &raw)?,
            None => defaults.port,
        };

        let confidence_threshold = match get("MIN_RETRIEVAL_CONFIDENCE") {
            Some(raw) => parse::<f64>("MIN_RETRIEVAL_CONFIDENCE", &raw)?,
            None => defaults.confidence_threshold,
        };
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(OrchestrationError::ConfigError(format!(
                "MIN_RETRIEVAL_CONFIDENCE must be within [0, 1], got {}",
                confidence_threshold
            )));
        }

        let voice_output_enabled = match get("VOICE_OUTPUT_ENABLED") {
            Some(raw) => parse_bool("VOICE_OUTPUT_ENABLED", &raw)?,
            None => defaults.voice_output_enabled,
        };

        let retrieval_top_k = match get("RETRIEVAL_TOP_K") {
            Some(raw) => parse::<usize>("RETRIEVAL_TOP_K", &raw)?.max(1),
            None => defaults.retrieval_top_k,
        };

        let mut retry = defaults.retry.clone();
        if let Some(raw) = get("RETRY_MAX_ATTEMPTS") {
            retry.max_attempts = parse::<u32>("RETRY_MAX_ATTEMPTS", &raw)?.max(1);
        }
        if let Some(raw) = get("RETRY_INITIAL_BACKOFF_MS") {
            retry.initial_backoff =
                Duration::from_millis(parse::<u64>("RETRY_INITIAL_BACKOFF_MS", &raw)?);
        }

        let audio_retention = match get("AUDIO_RETENTION_SECS") {
            Some(raw) => Duration::from_secs(parse::<u64>("AUDIO_RETENTION_SECS", &raw)?),
            None => defaults.audio_retention,
        };

        Ok(Self {
            port,
            confidence_threshold,
            voice_output_enabled,
            retrieval_top_k,
            retry,
            audio_retention,
            alpha_vantage_api_key: get("ALPHA_VANTAGE_API_KEY").unwrap_or_default(),
            alpha_vantage_base_url: get("ALPHA_VANTAGE_BASE_URL")
                .unwrap_or(defaults.alpha_vantage_base_url),
            gemini_api_key: get("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            stt_endpoint: get("STT_ENDPOINT"),
            tts_endpoint: get("TTS_ENDPOINT"),
            corpus_path: get("RETRIEVER_CORPUS_PATH").map(PathBuf::from),
        })
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| OrchestrationError::ConfigError(format!("{} is invalid ({}): {}", key, raw, e)))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(OrchestrationError::ConfigError(format!(
            "{} must be true or false, got {}",
            key, raw
        ))),
    }
}
