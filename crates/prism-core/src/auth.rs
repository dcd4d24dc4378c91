use std::collections::BTreeMap;

use secrecy::{ExposeSecret, SecretString};

/// Credential material returned by an [`AuthStore`]
#[derive(Debug, Clone, Default)]
pub struct Credential {
    /// Bearer token
    pub token: Option<SecretString>,
    /// Named session cookies
    pub cookies: BTreeMap<String, SecretString>,
}

impl Credential {
    /// Render the cookies as a `Cookie` header value
    ///
    /// Returns `None` when no cookies are present.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }

        let header = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{name}={}", value.expose_secret()))
            .collect::<Vec<_>>()
            .join("; ");

        Some(header)
    }
}

/// Lookup of credentials by profile name
///
/// Credential persistence and refresh live outside the gateway; the
/// gateway only asks for the current credential when it builds a call.
pub trait AuthStore: Send + Sync {
    fn get_credential(&self, profile: &str) -> Option<Credential>;
}
