//! Static credential store backed by the `[auth]` configuration section

use std::collections::BTreeMap;

use indexmap::IndexMap;
use prism_config::{AuthConfig, AuthProfileConfig};
use prism_core::{AuthStore, Credential};

/// [`AuthStore`] serving the profiles declared in the config file
#[derive(Debug, Default)]
pub struct StaticAuthStore {
    profiles: IndexMap<String, AuthProfileConfig>,
}

impl StaticAuthStore {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            profiles: config.profiles.clone(),
        }
    }
}

impl AuthStore for StaticAuthStore {
    fn get_credential(&self, profile: &str) -> Option<Credential> {
        let entry = self.profiles.get(profile).filter(|p| !p.is_empty())?;

        Some(Credential {
            token: entry.token.clone(),
            cookies: entry
                .cookies
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect::<BTreeMap<_, _>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use secrecy::{ExposeSecret, SecretString};

    use super::*;

    #[test]
    fn returns_configured_profile() {
        let mut profile = AuthProfileConfig::default();
        profile.token = Some(SecretString::from("ghu_token"));

        let mut config = AuthConfig::default();
        config.profiles.insert("work".to_owned(), profile);

        let store = StaticAuthStore::from_config(&config);
        let credential = store.get_credential("work").unwrap();

        assert_eq!(credential.token.unwrap().expose_secret(), "ghu_token");
        assert!(store.get_credential("home").is_none());
    }

    #[test]
    fn empty_profile_is_absent() {
        let mut config = AuthConfig::default();
        config.profiles.insert("blank".to_owned(), AuthProfileConfig::default());

        assert!(StaticAuthStore::from_config(&config).get_credential("blank").is_none());
    }
}
