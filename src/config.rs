use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::normalize::{NormalizeOptions, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_SIDE};
use crate::postprocess::CleanupOptions;
use crate::upstream::{
    UpstreamSettings, DEFAULT_API_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE,
    DEFAULT_TIMEOUT,
};

// ── Constants ────────────────────────────────────────────────────────────────

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

const BIND_ADDR: &str = "CAPTION_BIND_ADDR";
const API_KEY: &str = "DASHSCOPE_API_KEY";
const API_URL: &str = "DASHSCOPE_API_URL";
const MODEL: &str = "CAPTION_MODEL";
const MAX_TOKENS: &str = "CAPTION_MAX_TOKENS";
const TEMPERATURE: &str = "CAPTION_TEMPERATURE";
const TIMEOUT_SECS: &str = "CAPTION_UPSTREAM_TIMEOUT_SECS";
const MAX_SIDE: &str = "CAPTION_MAX_SIDE";
const JPEG_QUALITY: &str = "CAPTION_JPEG_QUALITY";
const PHRASE_REWRITES: &str = "CAPTION_PHRASE_REWRITES";
const MAX_UPLOAD_BYTES: &str = "CAPTION_MAX_UPLOAD_BYTES";

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{key} is out of range: {reason}")]
    OutOfRange { key: &'static str, reason: &'static str },
}

// ── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub upstream: UpstreamSettings,
    pub normalize: NormalizeOptions,
    pub cleanup: CleanupOptions,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Read settings from the process environment, after loading `.env` if
    /// one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get(API_KEY).ok_or(ConfigError::Missing(API_KEY))?;

        let api_url = get(API_URL).unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let parsed = Url::parse(&api_url).map_err(|_| ConfigError::Invalid {
            key: API_URL,
            value: api_url.clone(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::OutOfRange {
                key: API_URL,
                reason: "scheme must be http or https",
            });
        }

        let timeout = match get(TIMEOUT_SECS) {
            Some(raw) => Duration::from_secs(parse_value(TIMEOUT_SECS, &raw)?),
            None => DEFAULT_TIMEOUT,
        };

        let temperature: f64 = parse_or(&get, TEMPERATURE, DEFAULT_TEMPERATURE)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::OutOfRange {
                key: TEMPERATURE,
                reason: "must be between 0 and 2",
            });
        }

        let max_side: u32 = parse_or(&get, MAX_SIDE, DEFAULT_MAX_SIDE)?;
        if max_side == 0 {
            return Err(ConfigError::OutOfRange {
                key: MAX_SIDE,
                reason: "must be greater than 0",
            });
        }

        let jpeg_quality: u8 = parse_or(&get, JPEG_QUALITY, DEFAULT_JPEG_QUALITY)?;
        if !(1..=100).contains(&jpeg_quality) {
            return Err(ConfigError::OutOfRange {
                key: JPEG_QUALITY,
                reason: "must be between 1 and 100",
            });
        }

        let phrase_rewrites = match get(PHRASE_REWRITES) {
            Some(raw) => parse_flag(PHRASE_REWRITES, &raw)?,
            None => CleanupOptions::default().phrase_rewrites,
        };

        Ok(Self {
            bind_addr: get(BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            upstream: UpstreamSettings {
                api_url,
                api_key,
                model: get(MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                max_tokens: parse_or(&get, MAX_TOKENS, DEFAULT_MAX_TOKENS)?,
                temperature,
                timeout,
            },
            normalize: NormalizeOptions {
                max_side,
                jpeg_quality,
            },
            cleanup: CleanupOptions { phrase_rewrites },
            max_upload_bytes: parse_or(&get, MAX_UPLOAD_BYTES, DEFAULT_MAX_UPLOAD_BYTES)?,
        })
    }
}

// ── Parsing helpers ──────────────────────────────────────────────────────────

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
        }),
    }
}
