//! Gemini reached through a browser session
//!
//! Session cookies (`__Secure-1PSID`, `__Secure-1PSIDTS`) come from the
//! configured auth profile at call time, so a refreshed credential is
//! picked up without a restart. The endpoint at `base_url` accepts the
//! `generateContent` body shape and answers in one shot.

use std::sync::Arc;

use async_trait::async_trait;
use prism_config::LlmProviderConfig;
use prism_core::AuthStore;
use reqwest::Client;
use reqwest::header::COOKIE;
use url::Url;

use super::gemini::DEFAULT_MODEL;
use super::{GenerationRequest, ProviderCapabilities, ProviderClient, send_error, status_error};
use crate::convert::google::{google_response_text, prompt_to_google_request};
use crate::error::LlmError;
use crate::protocol::google::{GoogleErrorResponse, GoogleResponse};

/// Gemini provider authenticated with session cookies
pub struct GeminiCookieProvider {
    name: String,
    client: Client,
    base_url: Url,
    profile: String,
    auth: Arc<dyn AuthStore>,
    default_model: String,
    models: Vec<String>,
}

impl GeminiCookieProvider {
    /// Create from provider configuration
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Configuration` if `base_url` or `profile` is missing.
    pub fn new(name: String, config: &LlmProviderConfig, auth: Arc<dyn AuthStore>) -> Result<Self, LlmError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| LlmError::Configuration(format!("provider {name} requires a base_url")))?;

        let profile = config
            .profile
            .clone()
            .ok_or_else(|| LlmError::Configuration(format!("provider {name} requires an auth profile")))?;

        Ok(Self {
            name,
            client: Client::new(),
            base_url,
            profile,
            auth,
            default_model: config.default_model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            models: config.models.clone(),
        })
    }

    fn cookie_header(&self) -> Result<String, LlmError> {
        self.auth
            .get_credential(&self.profile)
            .and_then(|credential| credential.cookie_header())
            .ok_or_else(|| {
                tracing::warn!(provider = %self.name, profile = %self.profile, "no session cookies available");
                LlmError::Upstream(format!("no session cookies for profile {}", self.profile))
            })
    }
}

#[async_trait]
impl ProviderClient for GeminiCookieProvider {
    fn name(&self) -> &str {
        &self.name
    }


    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: false,
            attachments: false,
        }
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn models(&self) -> &[String] {
        &self.models
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let cookies = self.cookie_header()?;
        let body = prompt_to_google_request(&request.prompt, &[], &request.params);

        let base = self.base_url.as_str().trim_end_matches('/');
        let url = format!("{base}/models/{}:generateContent", request.model.model_id);

        let response = self
            .client
            .post(&url)
            .header(COOKIE, cookies)
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

        Ok(google_response_text(&wire_response))
    }
}
