//! Google Generative Language API provider, authenticated with an API key

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use prism_config::LlmProviderConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{FragmentStream, GenerationRequest, ProviderCapabilities, ProviderClient, send_error, status_error};
use crate::convert::google::{google_response_text, prompt_to_google_request};
use crate::error::LlmError;
use crate::protocol::google::{GoogleErrorResponse, GoogleResponse};

/// Default Google Generative Language API base URL
pub(crate) const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used when neither the request nor the config names one
pub(crate) const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Header carrying the API key
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini provider using the public API
pub struct GeminiProvider {
    name: String,
    client: Client,
    base_url: Url,
    api_key: SecretString,
    default_model: String,
    models: Vec<String>,
}

impl GeminiProvider {
    /// Create from provider configuration
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Configuration` if no API key is configured.
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded default base URL is invalid (should never happen).
    pub fn new(name: String, config: &LlmProviderConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| LlmError::Configuration(format!("provider {name} requires an api_key")))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL).expect("valid default URL"));

        Ok(Self {
            name,
            client: Client::new(),
            base_url,
            api_key,
            default_model: config.default_model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            models: config.models.clone(),
        })
    }

    /// Build a model endpoint URL, e.g. `models/gemini-2.5-flash:generateContent`
    fn method_url(&self, model: &str, method: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/models/{model}:{method}")
    }
}

#[async_trait]
impl ProviderClient for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }


    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: true,
            attachments: true,
        }
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn models(&self) -> &[String] {
        &self.models
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let body = prompt_to_google_request(&request.prompt, &request.attachments, &request.params);
        let url = self.method_url(&request.model.model_id, "generateContent");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(&self.name, &e))?;

        if !response.status().is_success() {
            return Err(status_error::<GoogleErrorResponse>(&self.name, response).await);
        }

        let wire_response: GoogleResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Upstream(format!("failed to parse response: {e}")))?;

        if wire_response.candidates.is_empty() {
            tracing::warn!(provider = %self.name, "response carried no candidates");
        }

        Ok(google_response_text(&wire_response))
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<FragmentStream, LlmError> {
        let body = prompt_to_google_request(&request.prompt, &request.attachments, &request.params);
        let url = format!(
            "{}?alt=sse",
            self.method_url(&request.model.model_id, "streamGenerateContent")
        );

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(&self.name, &e))?;

        if !response.status().is_success() {
            return Err(status_error::<GoogleErrorResponse>(&self.name, response).await);
        }

        let fragments = response.bytes_stream().eventsource().filter_map(|result| async move {
            match result {
                Ok(event) => {
                    let data = event.data.trim();
                    if data.is_empty() {
                        return None;
                    }

                    match serde_json::from_str::<GoogleResponse>(data) {
                        Ok(chunk) => {
                            let text = google_response_text(&chunk);
                            (!text.is_empty()).then_some(Ok(text))
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "skipping unparseable Gemini SSE chunk");
                            None
                        }
                    }
                }
                Err(e) => Some(Err(LlmError::Streaming(e.to_string()))),
            }
        });

        Ok(Box::pin(fragments))
    }
}
