//! Secrets access for provider client credentials
//!
//! OAuth client ids and secrets are looked up through the [`SecretsProvider`] trait
//! using the env keys named in the provider registry (e.g. `JIRA_CLIENT_ID`).
//!
//! - **EnvSecretsProvider** (default): reads process environment variables and `.env`
//! - **StaticSecretsProvider**: reads a fixed map, used for config-supplied values and tests

mod env;

pub use env::EnvSecretsProvider;

use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// Provides access to secrets and environment variables
#[async_trait::async_trait]
pub trait SecretsProvider: Send + Sync {
    /// Get a single secret value by key
    ///
    /// Returns None if the secret doesn't exist.
    async fn get_secret(&self, key: &str) -> Result<Option<String>>;

    /// Get a secret value with a default fallback
    async fn get_secret_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get_secret(key)
            .await?
            .unwrap_or_else(|| default.to_string()))
    }
}

/// Secrets provider backed by a fixed map
#[derive(Debug, Clone, Default)]
pub struct StaticSecretsProvider {
    values: HashMap<String, String>,
}

impl StaticSecretsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret, builder style
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticSecretsProvider {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl SecretsProvider for StaticSecretsProvider {
    async fn get_secret(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }
}

/// Expand `$env:VARNAME` patterns in a string using the secrets provider
///
/// - Variable names must start with a letter or underscore
/// - Unknown variables are left unchanged
/// - Multiple patterns in the same string are all expanded
pub async fn expand_value(value: &str, provider: &Arc<dyn SecretsProvider>) -> Result<String> {
    static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"\$env:([A-Za-z_][A-Za-z0-9_]*)").expect("Invalid environment variable regex")
    });

    // Fast path
    if !value.contains("$env:") {
        return Ok(value.to_string());
    }

    let mut result = String::with_capacity(value.len());
    let mut last_match = 0;

    for cap in ENV_VAR_PATTERN.captures_iter(value) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&value[last_match..full_match.start()]);

        match provider.get_secret(var_name.as_str()).await? {
            Some(secret_value) => result.push_str(&secret_value),
            None => result.push_str(full_match.as_str()),
        }

        last_match = full_match.end();
    }

    result.push_str(&value[last_match..]);

    Ok(result)
}
