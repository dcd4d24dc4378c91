//! Shared transport for `OpenAI`-compatible chat completion upstreams

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Client;
use url::Url;

use super::{FragmentStream, GenerationRequest, send_error, status_error};
use crate::convert::openai::{prompt_to_openai_request, upstream_text};
use crate::error::LlmError;
use crate::protocol::openai::{OpenAiErrorResponse, UpstreamCompletion};

/// Chat completions client sending the flattened prompt as one user turn
pub(super) struct OpenAiCompatClient {
    client: Client,
    base_url: Url,
    extra_headers: &'static [(&'static str, &'static str)],
}

impl OpenAiCompatClient {
    pub(super) fn new(base_url: Url, extra_headers: &'static [(&'static str, &'static str)]) -> Self {
        Self {
            client: Client::new(),
            base_url,
            extra_headers,
        }
    }

    /// Build the chat completions URL
    fn completions_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    async fn send(
        &self,
        provider: &str,
        request: &GenerationRequest,
        bearer: Option<&str>,
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let body = prompt_to_openai_request(&request.model.model_id, &request.prompt, &request.params, stream);

        let mut builder = self.client.post(self.completions_url()).json(&body);

        for (name, value) in self.extra_headers {
            builder = builder.header(*name, *value);
        }

        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| send_error(provider, &e))?;

        if !response.status().is_success() {
            return Err(status_error::<OpenAiErrorResponse>(provider, response).await);
        }

        Ok(response)
    }

    pub(super) async fn generate(
        &self,
        provider: &str,
        request: &GenerationRequest,
        bearer: Option<&str>,
    ) -> Result<String, LlmError> {
        let response = self.send(provider, request, bearer, false).await?;

        let completion: UpstreamCompletion = response
            .json()
            .await
            .map_err(|e| LlmError::Upstream(format!("failed to parse response: {e}")))?;

        Ok(upstream_text(&completion).unwrap_or_default())
    }

    pub(super) async fn generate_stream(
        &self,
        provider: &str,
        request: &GenerationRequest,
        bearer: Option<&str>,
    ) -> Result<FragmentStream, LlmError> {
        let response = self.send(provider, request, bearer, true).await?;

        let fragments = response.bytes_stream().eventsource().filter_map(|result| async move {
            match result {
                Ok(event) => {
                    let data = event.data.trim();
                    if data.is_empty() || data == "[DONE]" {
                        return None;
                    }

                    match serde_json::from_str::<UpstreamCompletion>(data) {
                        Ok(chunk) => upstream_text(&chunk).map(Ok),
                        Err(e) => {
                            tracing::debug!(error = %e, "skipping unparseable SSE chunk");
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
