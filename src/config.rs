use std::{env, time::Duration};
use thiserror::Error;

use crate::chart::{DEFAULT_HEIGHT, DEFAULT_WIDTH, MAX_SIDE, MIN_SIDE};
use crate::narrative::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("invalid {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Linear,
    Torch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub model_path: String,
    pub meta_path: Option<String>,
    pub backend: Backend,
    pub port: u16,
    /// `None` disables the narrative; reports are produced without it.
    pub gemini: Option<GeminiConfig>,
    pub narrative_timeout: Duration,
    pub chart_width: u32,
    pub chart_height: u32,
}

impl Config {
    /// Read from the process environment (after `.env`, if the caller loaded one).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| env::var(k).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| get(k).filter(|v| !v.trim().is_empty());

        let model_path = get("MODEL_PATH").ok_or(ConfigError::Missing("MODEL_PATH"))?;
        let backend = match get("MODEL_BACKEND").as_deref() {
            None | Some("linear") => Backend::Linear,
            Some("torch") => Backend::Torch,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "MODEL_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let gemini = get("GOOGLE_API_KEY").map(|api_key| GeminiConfig {
            api_key,
            model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            base_url: get("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
        });

        Ok(Self {
            model_path,
            meta_path: get("META_PATH"),
            backend,
            port: parse_or(&get, "PORT", 8080)?,
            gemini,
            narrative_timeout: Duration::from_secs(parse_or(&get, "NARRATIVE_TIMEOUT_S", 30)?),
            chart_width: chart_side(&get, "CHART_WIDTH", DEFAULT_WIDTH)?,
            chart_height: chart_side(&get, "CHART_HEIGHT", DEFAULT_HEIGHT)?,
        })
    }
}

fn parse_or<T, F>(get: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid { key, value: v }),
    }
}

fn chart_side<F>(get: &F, key: &'static str, default: u32) -> Result<u32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let side = parse_or(get, key, default)?;
    if (MIN_SIDE..=MAX_SIDE).contains(&side) {
        Ok(side)
    } else {
        Err(ConfigError::Invalid {
            key,
            value: side.to_string(),
        })
    }
}
