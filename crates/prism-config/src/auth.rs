use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;

/// Static credential profiles
///
/// Each profile is looked up by name from a provider's `profile` field.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(default)]
    pub profiles: IndexMap<String, AuthProfileConfig>,
}

/// Credentials stored under one profile name
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthProfileConfig {
    /// Bearer token (Copilot)
    #[serde(default)]
    pub token: Option<SecretString>,
    /// Session cookies by name (Gemini web)
    #[serde(default)]
    pub cookies: IndexMap<String, SecretString>,
}

impl AuthProfileConfig {
    pub fn is_empty(&self) -> bool {
        self.token.is_none() && self.cookies.is_empty()
    }
}
