//! Plain-language explanation of a valuation, produced by an external
//! text-generation service (Gemini).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::types::{FeatureRecord, ForecastSeries, PredictionResult};

/// Lines kept from the model's answer.
pub const MAX_LINES: usize = 5;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Error, Debug)]
pub enum NarrativeError {
    #[error("no text-generation credential configured")]
    NotConfigured,

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("empty response")]
    Empty,
}

/// Outcome of [`explain`]. Never an error: the report is still produced
/// when the narrative is unavailable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum Narrative {
    Available(String),
    Unavailable(String),
}

impl Narrative {
    pub fn text(&self) -> Option<&str> {
        match self {
            Narrative::Available(t) => Some(t),
            Narrative::Unavailable(_) => None,
        }
    }
}

/// Anything that turns a prompt into free text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, NarrativeError>;
}

/// Used when no API key is configured; always unavailable.
pub struct Disabled;

#[async_trait]
impl TextGenerator for Disabled {
    async fn generate(&self, _prompt: &str) -> Result<String, NarrativeError> {
        Err(NarrativeError::NotConfigured)
    }
}

pub fn build_prompt(
    record: &FeatureRecord,
    predicted: &PredictionResult,
    series: &ForecastSeries,
) -> String {
    let details = record
        .fields()
        .into_iter()
        .map(|(label, value)| format!("{}: {}", label, value))
        .collect::<Vec<_>>()
        .join(", ");
    let future = series
        .points()
        .iter()
        .map(|p| format!("({}, {:.2})", p.year, p.price))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are a car valuation expert.\n\
         Give ONLY 4-5 short lines.\n\
         \n\
         Car Details: {}\n\
         Predicted Price: {} Lakhs\n\
         Future Prices: [{}]\n",
        details, predicted, future
    )
}

/// First `n` non-empty lines of `text`, or `None` if there are none.
pub fn first_lines(text: &str, n: usize) -> Option<String> {
    let lines: Vec<&str> = text
        .trim()
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .take(n)
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// One outbound call, no retries. Failures become [`Narrative::Unavailable`].
pub async fn explain(
    generator: &dyn TextGenerator,
    record: &FeatureRecord,
    predicted: &PredictionResult,
    series: &ForecastSeries,
) -> Narrative {
    let prompt = build_prompt(record, predicted, series);
    match generator.generate(&prompt).await {
        Ok(text) => match first_lines(&text, MAX_LINES) {
            Some(t) => Narrative::Available(t),
            None => {
                tracing::warn!("narrative service returned only whitespace");
                Narrative::Unavailable(NarrativeError::Empty.to_string())
            }
        },
        Err(e) => {
            tracing::warn!("narrative unavailable: {}", e);
            Narrative::Unavailable(e.to_string())
        }
    }
}

// ---------- Gemini REST client ----------

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// Concatenated text parts of the first candidate.
fn extract_text(body: &str) -> Result<String, NarrativeError> {
    let resp: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| NarrativeError::Malformed(e.to_string()))?;
    let text: String = resp
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(NarrativeError::Empty);
    }
    Ok(text)
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, NarrativeError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, NarrativeError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        tracing::info!("requesting narrative from {}", self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({ "contents": [{ "parts": [{ "text": prompt }] }] }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NarrativeError::Status { status, body });
        }

        let body = response.text().await?;
        extract_text(&body)
    }
}
