//! Client model name resolution
//!
//! Maps OpenAI-style model names to a provider family and a backend model
//! id. Resolution never fails: names that match nothing are sent as-is to
//! the default provider.

use prism_config::{AliasConfig, ProviderTag};

/// Built-in aliases, consulted after the configured ones
const BUILTIN_ALIASES: &[(&str, ProviderTag, &str)] = &[
    ("gpt-4o-mini", ProviderTag::Gemini, "gemini-2.5-flash"),
    ("gpt-4o", ProviderTag::Gemini, "gemini-2.5-pro"),
    ("gpt-4.1-mini", ProviderTag::Gemini, "gemini-3.0-pro"),
    ("gemini-flash", ProviderTag::Gemini, "gemini-2.5-flash"),
    ("gemini-pro", ProviderTag::Gemini, "gemini-2.5-pro"),
    ("gemini-3-pro", ProviderTag::Gemini, "gemini-3.0-pro"),
    ("claude-3-5-sonnet", ProviderTag::Anthropic, "claude-3-5-sonnet-20241022"),
];

/// Provider family and backend model a request is dispatched to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    /// Provider family serving the request
    pub provider: ProviderTag,
    /// Model identifier sent to the backend
    pub model_id: String,
}

impl ResolvedModel {
    pub fn new(provider: ProviderTag, model_id: impl Into<String>) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
        }
    }
}

/// Immutable alias lookup table
///
/// Built once at startup; only entries whose provider family is
/// configured are kept, so every resolution lands on a live provider.
#[derive(Debug, Clone)]
pub struct AliasTable {
    entries: Vec<(String, ResolvedModel)>,
    configured: Vec<ProviderTag>,
    default: ResolvedModel,
}

impl AliasTable {
    /// Build the table from configured aliases and the built-in set
    ///
    /// `default` serves empty model names and its provider receives every
    /// unknown name. `configured` lists the provider families that have a
    /// client.
    pub fn new(aliases: &[AliasConfig], default: ResolvedModel, configured: &[ProviderTag]) -> Self {
        let configured_entries = aliases
            .iter()
            .map(|a| (a.name.clone(), ResolvedModel::new(a.provider, a.model.clone())));

        let builtin_entries = BUILTIN_ALIASES.iter().filter_map(|&(name, provider, model)| {
            if configured.contains(&provider) {
                Some((name.to_owned(), ResolvedModel::new(provider, model)))
            } else {
                tracing::warn!(alias = name, provider = %provider, "dropping built-in alias, provider family is not configured");
                None
            }
        });

        let mut entries: Vec<(String, ResolvedModel)> = Vec::new();

        for (name, target) in configured_entries.chain(builtin_entries) {
            if entries.iter().any(|(existing, _)| *existing == name) {
                continue;
            }

            entries.push((name, target));
        }

        Self {
            entries,
            configured: configured.to_vec(),
            default,
        }
    }

    /// Resolve a client model name
    ///
    /// Lookup order: empty name, exact alias, explicit `tag/model`, then
    /// passthrough of the unchanged name to the default provider.
    pub fn resolve(&self, name: &str) -> ResolvedModel {
        if name.trim().is_empty() {
            return self.default.clone();
        }

        if let Some((_, target)) = self.entries.iter().find(|(alias, _)| alias == name) {
            return target.clone();
        }

        if let Some((prefix, model_id)) = name.split_once('/')
            && let Some(tag) = ProviderTag::from_prefix(prefix)
            && self.configured.contains(&tag)
            && !model_id.is_empty()
        {
            return ResolvedModel::new(tag, model_id);
        }

        ResolvedModel::new(self.default.provider, name)
    }

    /// Alias names and their targets, in lookup order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ResolvedModel)> {
        self.entries.iter().map(|(name, target)| (name.as_str(), target))
    }

    /// Target for requests without a model name
    pub const fn default_model(&self) -> &ResolvedModel {
        &self.default
    }
}
