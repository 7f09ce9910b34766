use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::GenerationError;
use crate::types::*;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
const DIRECT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// How the generation endpoint expects to be called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EndpointKind {
    /// Server-side proxy taking `{prompt}` and holding the API key itself.
    #[default]
    Proxy,
    /// The generative-language `generateContent` API, keyed by query param.
    Direct,
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub kind: EndpointKind,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            // netlify dev default
            endpoint: "http://localhost:8888/.netlify/functions/generate".to_string(),
            kind: EndpointKind::Proxy,
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl GenerationConfig {
    /// Build a config from `VOWPLAN_*` environment variables.
    ///
    /// With `VOWPLAN_GENERATE_URL` set the proxy is used; otherwise an API key
    /// (`VOWPLAN_API_KEY` or `GEMINI_API_KEY`) switches to the direct API.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        config.api_key = var("VOWPLAN_API_KEY").or_else(|| var("GEMINI_API_KEY"));
        if let Some(model) = var("VOWPLAN_MODEL") {
            config.model = model;
        }
        if let Some(secs) = var("VOWPLAN_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout = Duration::from_secs(secs),
                _ => warn!("Ignoring invalid VOWPLAN_TIMEOUT_SECS={}", secs),
            }
        }

        match var("VOWPLAN_GENERATE_URL") {
            Some(url) => config.endpoint = url,
            None if config.api_key.is_some() => {
                config.kind = EndpointKind::Direct;
                config.endpoint = DIRECT_BASE_URL.to_string();
            }
            None => {}
        }
        config
    }

    fn request_url(&self) -> String {
        match self.kind {
            EndpointKind::Proxy => self.endpoint.clone(),
            EndpointKind::Direct => format!(
                "{}/{}:generateContent",
                self.endpoint.trim_end_matches('/'),
                self.model
            ),
        }
    }
}

/// Anything that turns a prompt into free text. Implemented by the HTTP
/// client and by test mocks.
pub trait GenerateBackend: Send + Sync {
    fn model_name(&self) -> &str;

    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, GenerationError>> + Send;
}

pub struct GenerationClient {
    config: GenerationConfig,
    http: reqwest::Client,
}

impl GenerationClient {
    pub fn new(config: GenerationConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    async fn send(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = self.config.request_url();
        debug!("Generation request to {} ({} chars)", url, prompt.len());

        let mut req_builder = match self.config.kind {
            EndpointKind::Proxy => self.http.post(&url).json(&GenerateRequest { prompt }),
            EndpointKind::Direct => self
                .http
                .post(&url)
                .json(&GenerateContentRequest::from_prompt(prompt)),
        };
        if let Some(api_key) = &self.config.api_key {
            req_builder = match self.config.kind {
                EndpointKind::Direct => req_builder.query(&[("key", api_key)]),
                EndpointKind::Proxy => req_builder.bearer_auth(api_key),
            };
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| GenerationError::Failure(format!("failed to send request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            // Error bodies are not guaranteed to be JSON.
            let error_text = response.text().await.unwrap_or_default();
            warn!("Generation request failed ({}): {}", status, error_text);
            return Err(GenerationError::Failure(format!("status {}", status)));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Failure(format!("failed to parse response: {}", e)))?;

        info!(
            "Generation response: candidates={}, finish_reason={:?}",
            body.candidates.len(),
            body.candidates.first().and_then(|c| c.finish_reason.as_ref())
        );

        match body.text() {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            _ => Err(GenerationError::EmptyResponse),
        }
    }
}

impl GenerateBackend for GenerationClient {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let timeout = self.config.timeout;
        tokio::time::timeout(timeout, self.send(prompt))
            .await
            .map_err(|_| {
                warn!("Generation request timed out after {:?}", timeout);
                GenerationError::Timeout(timeout)
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_url_includes_model() {
        let config = GenerationConfig {
            kind: EndpointKind::Direct,
            endpoint: format!("{}/", DIRECT_BASE_URL),
            ..Default::default()
        };
        assert_eq!(
            config.request_url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-pro:generateContent"
        );
    }

    #[test]
    fn proxy_url_is_endpoint() {
        let config = GenerationConfig::default();
        assert_eq!(config.request_url(), config.endpoint);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }
}
