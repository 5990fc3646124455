//! HTTP client for a local Ollama endpoint, used by the relevance filter.
//!
//! The judging call constrains the model with a JSON schema so the response
//! can be decoded directly into a [`Verdict`]; a text heuristic catches
//! models that answer in prose anyway.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::contract::ConfigError;
use crate::load_config::OllamaConfig;

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("ollama request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ollama returned an empty response")]
    EmptyResponse,
}

/// Structured judgement the model is asked to return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub valid: bool,
    pub reason: String,
}

pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "ollama",
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Probe the service's tag listing. Returns false instead of erroring so
    /// callers can treat an unreachable service as a degraded-mode condition
    /// rather than a fatal one.
    pub async fn check_connection(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                info!(url = %url, model = %self.model, "ollama service reachable");
                true
            }
            Ok(response) => {
                warn!(url = %url, status = %response.status(), "ollama service returned an error status");
                false
            }
            Err(e) => {
                warn!(url = %url, error = %e, "ollama service unreachable");
                false
            }
        }
    }

    /// Ask the model for a yes/no judgement on the prompt. Temperature is
    /// pinned to zero so repeated runs over the same item agree.
    pub async fn verdict(&self, prompt: &str) -> Result<Verdict, OllamaError> {
        let url = format!("{}/api/generate", self.base_url);
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": 0.0 },
            "format": verdict_schema(),
        });

        debug!(url = %url, "calling ollama generate");
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        #[derive(Deserialize)]
        struct GenerateResponse {
            #[serde(default)]
            response: String,
        }

        let body: GenerateResponse = response.json().await?;
        if body.response.trim().is_empty() {
            return Err(OllamaError::EmptyResponse);
        }

        match serde_json::from_str::<Verdict>(&body.response) {
            Ok(verdict) => Ok(verdict),
            Err(e) => {
                debug!(error = %e, raw = %body.response, "response was not verdict JSON, falling back to text heuristics");
                Ok(parse_text_verdict(&body.response))
            }
        }
    }
}

/// JSON schema handed to Ollama's structured-output support, mirroring
/// [`Verdict`].
fn verdict_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "valid": { "type": "boolean" },
            "reason": { "type": "string" }
        },
        "required": ["valid", "reason"]
    })
}

/// Last-resort interpretation of a prose answer. Negations are checked
/// first, because "invalid" contains "valid".
fn parse_text_verdict(text: &str) -> Verdict {
    let lower = text.to_lowercase();
    let valid = if lower.contains("no") || lower.contains("false") || lower.contains("invalid") {
        false
    } else {
        lower.contains("yes") || lower.contains("true") || lower.contains("valid")
    };

    Verdict {
        valid,
        reason: text.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_fallback_detects_affirmative_answers() {
        let verdict = parse_text_verdict("Yes, this is clearly on topic.");
        assert!(verdict.valid);
        assert_eq!(verdict.reason, "Yes, this is clearly on topic.");
    }

    #[test]
    fn text_fallback_detects_negative_answers() {
        assert!(!parse_text_verdict("No, unrelated to the topic.").valid);
        assert!(!parse_text_verdict("The claim is invalid.").valid);
    }

    #[test]
    fn text_fallback_defaults_to_rejection_when_undecidable() {
        assert!(!parse_text_verdict("Hard to say.").valid);
    }

    #[test]
    fn verdict_decodes_from_schema_constrained_json() {
        let verdict: Verdict =
            serde_json::from_str(r#"{"valid": true, "reason": "on topic"}"#).unwrap();
        assert!(verdict.valid);
        assert_eq!(verdict.reason, "on topic");
    }
}
