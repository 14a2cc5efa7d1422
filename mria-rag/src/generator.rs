//! Answer generation.
//!
//! The pipeline treats the language model as an opaque `prompt -> text`
//! function behind the [`Generator`] trait. [`GeminiGenerator`] (feature
//! `gemini`) calls the Gemini `generateContent` REST endpoint.

use async_trait::async_trait;

use crate::error::Result;

/// A language model that turns a prompt into an answer.
///
/// Failures are reported as [`RagError::GenerationUnavailable`] and are not
/// retried by the pipeline.
///
/// [`RagError::GenerationUnavailable`]: crate::RagError::GenerationUnavailable
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Short name used in logs and error messages.
    fn name(&self) -> &str;
}

#[cfg(feature = "gemini")]
pub use gemini::GeminiGenerator;

#[cfg(feature = "gemini")]
mod gemini {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use tracing::{debug, error};

    use super::Generator;
    use crate::config::ServiceEndpoints;
    use crate::error::{RagError, Result};

    const PROVIDER: &str = "gemini";
    const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// A [`Generator`] backed by the Gemini API.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use mria_rag::{GeminiGenerator, Generator, ServiceEndpoints};
    ///
    /// let generator = GeminiGenerator::from_endpoints(&ServiceEndpoints::from_env())?;
    /// let answer = generator.generate("Say hello").await?;
    /// ```
    pub struct GeminiGenerator {
        client: reqwest::Client,
        api_key: String,
        model: String,
        base_url: String,
        temperature: Option<f32>,
    }

    impl GeminiGenerator {
        /// Create a generator for `model` (e.g. `gemini-1.5-pro`).
        pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
            let api_key = api_key.into();
            if api_key.trim().is_empty() {
                return Err(RagError::Config("Gemini API key must not be empty".into()));
            }
            let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build().map_err(
                |e| RagError::Config(format!("failed to build Gemini HTTP client: {e}")),
            )?;
            Ok(Self {
                client,
                api_key,
                model: model.into(),
                base_url: BASE_URL.to_string(),
                temperature: None,
            })
        }

        /// Create a generator from `GEMINI_API_KEY` / `GOOGLE_API_KEY` and `GEMINI_MODEL`.
        pub fn from_endpoints(endpoints: &ServiceEndpoints) -> Result<Self> {
            let api_key = endpoints.gemini_api_key.clone().ok_or_else(|| {
                RagError::Config("GEMINI_API_KEY or GOOGLE_API_KEY must be set".into())
            })?;
            Self::new(api_key, endpoints.gemini_model.clone())
        }

        /// Override the API base URL (proxies, test servers).
        pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
            self.base_url = base_url.into().trim_end_matches('/').to_string();
            self
        }

        /// Set the sampling temperature.
        pub fn with_temperature(mut self, temperature: f32) -> Self {
            self.temperature = Some(temperature);
            self
        }

        fn unavailable(message: String) -> RagError {
            RagError::GenerationUnavailable { provider: PROVIDER.into(), message }
        }
    }

    // ── Gemini API request/response types ─────────────────────────────

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct GenerateRequest<'a> {
        contents: [Content<'a>; 1],
        #[serde(skip_serializing_if = "Option::is_none")]
        generation_config: Option<GenerationConfig>,
    }

    #[derive(Serialize)]
    struct Content<'a> {
        role: &'static str,
        parts: [Part<'a>; 1],
    }

    #[derive(Serialize)]
    struct Part<'a> {
        text: &'a str,
    }

    #[derive(Serialize)]
    struct GenerationConfig {
        temperature: f32,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct GenerateResponse {
        #[serde(default)]
        candidates: Vec<Candidate>,
        prompt_feedback: Option<PromptFeedback>,
    }

    #[derive(Deserialize)]
    struct Candidate {
        content: Option<CandidateContent>,
    }

    #[derive(Deserialize)]
    struct CandidateContent {
        #[serde(default)]
        parts: Vec<CandidatePart>,
    }

    #[derive(Deserialize)]
    struct CandidatePart {
        text: Option<String>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct PromptFeedback {
        block_reason: Option<String>,
    }

    #[derive(Deserialize)]
    struct ErrorResponse {
        error: ErrorDetail,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    impl GenerateResponse {
        fn into_text(self) -> Result<String> {
            let text: String = self
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content)
                .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
                .unwrap_or_default();

            if !text.trim().is_empty() {
                return Ok(text);
            }
            let reason = self
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .map_or_else(|| "no candidates returned".to_string(), |r| format!("blocked: {r}"));
            Err(GeminiGenerator::unavailable(reason))
        }
    }

    #[async_trait]
    impl Generator for GeminiGenerator {
        async fn generate(&self, prompt: &str) -> Result<String> {
            debug!(provider = PROVIDER, model = %self.model, prompt_chars = prompt.len(), "generating");

            let body = GenerateRequest {
                contents: [Content { role: "user", parts: [Part { text: prompt }] }],
                generation_config: self.temperature.map(|temperature| GenerationConfig { temperature }),
            };
            let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    error!(provider = PROVIDER, error = %e, "request failed");
                    Self::unavailable(format!("request failed: {e}"))
                })?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let detail = serde_json::from_str::<ErrorResponse>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                error!(provider = PROVIDER, %status, "API error");
                return Err(Self::unavailable(format!("API returned {status}: {detail}")));
            }

            let parsed: GenerateResponse = response.json().await.map_err(|e| {
                error!(provider = PROVIDER, error = %e, "failed to parse response");
                Self::unavailable(format!("failed to parse response: {e}"))
            })?;
            parsed.into_text()
        }

        fn name(&self) -> &str {
            PROVIDER
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn extracts_candidate_text() {
            let response: GenerateResponse = serde_json::from_str(
                r#"{"candidates":[{"content":{"parts":[{"text":"The mat "},{"text":"was red."}]}}]}"#,
            )
            .unwrap();
            assert_eq!(response.into_text().unwrap(), "The mat was red.");
        }

        #[test]
        fn blocked_prompt_is_unavailable() {
            let response: GenerateResponse =
                serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
            let err = response.into_text().unwrap_err();
            assert!(matches!(err, RagError::GenerationUnavailable { .. }));
            assert!(err.to_string().contains("SAFETY"));
        }

        #[test]
        fn empty_key_is_rejected() {
            assert!(GeminiGenerator::new("", "gemini-1.5-pro").is_err());
        }
    }
}
