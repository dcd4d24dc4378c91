//! Per-request orchestration
//!
//! resolve alias → select client → flatten → call through the pool →
//! recover tool calls → build a response or an event stream.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use prism_config::{LlmConfig, ProviderTag};
use prism_core::{AuthStore, RequestContext};
use prism_telemetry::metrics;

use crate::alias::{AliasTable, ResolvedModel};
use crate::error::LlmError;
use crate::pool::CallPool;
use crate::provider::{GenerationRequest, ProviderClient, ProviderRegistry};
use crate::recovery;
use crate::stream::{self, ChunkPolicy, EventStream, SyntheticEvents};
use crate::transform;
use crate::types::{ChatRequest, Choice, ChoiceMessage, CompletionResponse, FinishReason, ToolCall, Usage};

/// Shared state for LLM route handlers
#[derive(Clone)]
pub struct LlmState {
    pub(crate) inner: Arc<LlmStateInner>,
}

pub(crate) struct LlmStateInner {
    pub(crate) aliases: AliasTable,
    pub(crate) registry: ProviderRegistry,
    pub(crate) pool: CallPool,
    pub(crate) policy: ChunkPolicy,
}

/// A model advertised on `/v1/models`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    pub id: String,
    pub owned_by: ProviderTag,
}

/// A validated request bound to its provider
struct Prepared {
    client: Arc<dyn ProviderClient>,
    generation: Arc<GenerationRequest>,
}

impl Prepared {
    fn tag(&self) -> &'static str {
        self.generation.model.provider.as_str()
    }

    fn model_id(&self) -> &str {
        &self.generation.model.model_id
    }

    fn tools_active(&self) -> bool {
        !self.generation.tools.is_empty()
    }
}

impl LlmState {
    /// Build the state from the `[llm]` section, constructing all providers
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Configuration` if a provider cannot be built, no
    /// default provider is available, an alias targets an unconfigured
    /// family or a duration is malformed.
    pub fn from_config(config: &LlmConfig, auth: Arc<dyn AuthStore>) -> Result<Self, LlmError> {
        let registry = ProviderRegistry::from_config(config, &auth)?;

        let default_tag = config
            .default_provider_tag()
            .ok_or_else(|| LlmError::Configuration("no default provider".to_owned()))?;

        let default_client = registry.get(default_tag).ok_or_else(|| {
            LlmError::Configuration(format!("default provider {default_tag} is not configured"))
        })?;

        let default_model = config
            .default_model
            .clone()
            .unwrap_or_else(|| default_client.default_model().to_owned());

        let aliases = AliasTable::new(
            &config.aliases,
            ResolvedModel::new(default_tag, default_model),
            &registry.tags(),
        );

        if let Some((name, target)) = aliases
            .entries()
            .find(|(_, target)| !registry.is_configured(target.provider))
        {
            return Err(LlmError::Configuration(format!(
                "alias {name} targets {}, which is not configured",
                target.provider
            )));
        }

        tracing::info!(
            default_provider = %default_tag,
            default_model = %aliases.default_model().model_id,
            aliases = aliases.entries().count(),
            "LLM gateway ready"
        );

        Ok(Self::from_parts(
            aliases,
            registry,
            CallPool::from_config(config)?,
            ChunkPolicy::from_config(&config.streaming),
        ))
    }

    /// Assemble the state from prebuilt parts
    pub fn from_parts(aliases: AliasTable, registry: ProviderRegistry, pool: CallPool, policy: ChunkPolicy) -> Self {
        Self {
            inner: Arc::new(LlmStateInner {
                aliases,
                registry,
                pool,
                policy,
            }),
        }
    }

    /// Serve a non-streaming completion
    ///
    /// # Errors
    ///
    /// Returns `LlmError::InvalidRequest` before any provider call when the
    /// request is malformed, otherwise the pool's or the provider's error
    pub async fn complete(&self, request: ChatRequest, context: RequestContext) -> Result<CompletionResponse, LlmError> {
        let prepared = self.prepare(&request, &context)?;

        let text = observe(&prepared, false, self.generate(&prepared).await)?;
        let usage = Usage::estimate(&prepared.generation.prompt, &text);

        let (message, finish_reason) = if prepared.tools_active() {
            answer_with_tools(prepared.tag(), text)
        } else {
            (ChoiceMessage::text(text), FinishReason::Stop)
        };

        tracing::debug!(
            request_id = %context.request_id,
            provider = prepared.tag(),
            finish_reason = finish_reason.as_str(),
            tool_calls = message.tool_calls.len(),
            "completion finished"
        );

        Ok(CompletionResponse {
            id: completion_id(),
            created: unix_now(),
            model: prepared.model_id().to_owned(),
            choices: vec![Choice {
                index: 0,
                message,
                finish_reason: Some(finish_reason),
            }],
            usage: Some(usage),
        })
    }

    /// Serve a streaming completion
    ///
    /// Returns the backend model id and the event stream. Requests with
    /// active tools, and providers without native streaming, get a
    /// synthetic stream built from the complete answer.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is invalid or the provider fails
    /// before the first event
    pub async fn complete_stream(
        &self,
        request: ChatRequest,
        context: RequestContext,
    ) -> Result<(String, EventStream), LlmError> {
        let prepared = self.prepare(&request, &context)?;
        let id = completion_id();
        let model = prepared.model_id().to_owned();

        if !prepared.tools_active() && prepared.client.capabilities().streaming {
            let client = Arc::clone(&prepared.client);
            let generation = Arc::clone(&prepared.generation);

            let fragments = self
                .inner
                .pool
                .open_stream(prepared.tag(), async move { client.generate_stream(&generation).await })
                .await;
            let fragments = observe(&prepared, true, fragments)?;

            tracing::debug!(request_id = %context.request_id, provider = prepared.tag(), "streaming natively");

            let usage_prompt = request.include_usage.then(|| prepared.generation.prompt.clone());
            return Ok((model, stream::native(id, fragments, usage_prompt)));
        }

        let text = observe(&prepared, true, self.generate(&prepared).await)?;

        let usage = request
            .include_usage
            .then(|| Usage::estimate(&prepared.generation.prompt, &text));

        let (content, tool_calls) = if prepared.tools_active() {
            split_tool_calls(prepared.tag(), text)
        } else {
            (text, Vec::new())
        };

        tracing::debug!(
            request_id = %context.request_id,
            provider = prepared.tag(),
            tool_calls = tool_calls.len(),
            "streaming synthetically"
        );

        let policy = &self.inner.policy;
        let events = SyntheticEvents::new(id, content, tool_calls, usage, policy);

        Ok((model, stream::synthetic(events, policy.delay)))
    }

    /// Models advertised to clients
    ///
    /// Alias names come first, followed by the backend models of every
    /// configured provider. Duplicates are listed once.
    pub fn list_models(&self) -> Vec<ModelEntry> {
        let mut models: Vec<ModelEntry> = Vec::new();
        let mut push = |id: &str, owned_by: ProviderTag| {
            if !models.iter().any(|m| m.id == id) {
                models.push(ModelEntry {
                    id: id.to_owned(),
                    owned_by,
                });
            }
        };

        for (name, target) in self.inner.aliases.entries() {
            push(name, target.provider);
        }

        for (tag, client) in self.inner.registry.iter() {
            push(client.default_model(), tag);
            for model in client.models() {
                push(model, tag);
            }
        }

        models
    }

    fn prepare(&self, request: &ChatRequest, context: &RequestContext) -> Result<Prepared, LlmError> {
        let prompt = transform::prompt_for(request)?;
        let resolved = self.inner.aliases.resolve(&request.model);

        let client = self.inner.registry.get(resolved.provider).ok_or_else(|| {
            LlmError::Configuration(format!("no provider serves {}", resolved.provider))
        })?;

        let attachments = if client.capabilities().attachments {
            transform::attachments(&request.messages)
        } else {
            Vec::new()
        };

        tracing::debug!(
            request_id = %context.request_id,
            requested = %request.model,
            provider = %resolved.provider,
            model = %resolved.model_id,
            "resolved model"
        );

        Ok(Prepared {
            client,
            generation: Arc::new(GenerationRequest {
                model: resolved,
                prompt,
                messages: request.messages.clone(),
                tools: request.active_tools().to_vec(),
                attachments,
                params: request.params.clone(),
                stream: request.stream,
            }),
        })
    }

    /// One-shot provider call through the pool
    async fn generate(&self, prepared: &Prepared) -> Result<String, LlmError> {
        let client = Arc::clone(&prepared.client);
        let generation = Arc::clone(&prepared.generation);
        let start = Instant::now();

        let result = self
            .inner
            .pool
            .run(prepared.tag(), async move { client.generate(&generation).await })
            .await;

        metrics::record_upstream_duration(prepared.tag(), start);
        result
    }
}

/// Record the outcome of a provider call
fn observe<T>(prepared: &Prepared, stream: bool, result: Result<T, LlmError>) -> Result<T, LlmError> {
    let outcome = match &result {
        Ok(_) => "ok",
        Err(LlmError::UpstreamTimeout { .. }) => "timeout",
        Err(LlmError::Overloaded { .. }) => "overloaded",
        Err(_) => "error",
    };

    if let Err(e) = &result {
        tracing::warn!(provider = prepared.tag(), model = %prepared.model_id(), error = %e, "provider call failed");
    }

    metrics::record_request(prepared.tag(), prepared.model_id(), stream, outcome);
    result
}

/// Split recovered tool calls from the answer text
///
/// On a miss the text is returned untouched.
fn split_tool_calls(provider: &'static str, text: String) -> (String, Vec<ToolCall>) {
    let recovered = recovery::extract(&text);
    if recovered.tool_calls.is_empty() {
        return (text, Vec::new());
    }

    metrics::record_tool_calls(provider, recovered.tool_calls.len());
    (recovered.content, recovered.tool_calls)
}

fn answer_with_tools(provider: &'static str, text: String) -> (ChoiceMessage, FinishReason) {
    let (content, tool_calls) = split_tool_calls(provider, text);

    if tool_calls.is_empty() {
        (ChoiceMessage::text(content), FinishReason::Stop)
    } else {
        (ChoiceMessage::with_tool_calls(content, tool_calls), FinishReason::ToolCalls)
    }
}

fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
