//! Provider registry
//!
//! Static OAuth endpoint metadata for every supported PM tool, embedded in the
//! binary from `providers.json`. Adding a provider means adding an entry there
//! (plus the enum variant and identity strategy it names).
//!
//! Entries are resolved into a [`ProviderConfig`] on demand: endpoint overrides
//! from the config file are applied and client credentials are looked up through
//! the [`SecretsProvider`].

use crate::config::{OAuthConfig, ProviderOverride};
use crate::constants::DEMO_CLIENT_ID_PREFIX;
use crate::model::Provider;
use crate::secrets::{SecretsProvider, expand_value};
use crate::{ConnectError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// How a provider's workspace identity is looked up after the token exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityStrategy {
    /// `GET /oauth/token/accessible-resources`
    AtlassianAccessibleResources,
    /// GraphQL `viewer { organization }` plus team keys
    LinearViewer,
    /// GraphQL `me { account }`
    MondayMe,
    /// `GET /users/me` workspaces
    AsanaWorkspaces,
}

/// Extra authorize query parameter; order in the registry is preserved in the URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraParam {
    pub name: String,
    pub value: String,
}

/// Registry entry as embedded in `providers.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub id: Provider,
    pub name: String,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub api_base_url: String,
    pub scopes: Vec<String>,
    #[serde(default = "default_scope_separator")]
    pub scope_separator: String,
    #[serde(default)]
    pub extra_params: Vec<ExtraParam>,
    pub client_id_env_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_env_key: Option<String>,
    pub identity: IdentityStrategy,
}

fn default_scope_separator() -> String {
    " ".to_string()
}

/// A registry entry with overrides applied and client credentials resolved
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub provider: Provider,
    pub name: String,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub api_base_url: String,
    pub scopes: Vec<String>,
    pub scope_separator: String,
    pub extra_params: Vec<ExtraParam>,
    pub client_id_env_key: String,
    pub identity: IdentityStrategy,

    #[serde(skip_serializing)]
    pub client_id: Option<String>,

    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
}

impl ProviderConfig {
    /// Scopes joined with the provider's separator
    pub fn scope_param(&self) -> String {
        self.scopes.join(&self.scope_separator)
    }

    /// Whether a real client registration is available.
    ///
    /// Missing ids and `demo_`-prefixed placeholders are not.
    pub fn has_live_client(&self) -> bool {
        self.client_id
            .as_deref()
            .is_some_and(|id| !id.is_empty() && !id.starts_with(DEMO_CLIENT_ID_PREFIX))
    }
}

/// Registry of supported OAuth providers
pub struct ProviderRegistry {
    entries: Vec<RegistryEntry>,
    overrides: HashMap<String, ProviderOverride>,
    secrets: Arc<dyn SecretsProvider>,
}

impl ProviderRegistry {
    /// Create a registry over the embedded entries
    pub fn new(
        overrides: HashMap<String, ProviderOverride>,
        secrets: Arc<dyn SecretsProvider>,
    ) -> Result<Self> {
        Ok(Self {
            entries: Self::embedded_entries()?,
            overrides,
            secrets,
        })
    }

    /// Create a registry using the provider overrides of an OAuth config
    pub fn from_config(config: &OAuthConfig, secrets: Arc<dyn SecretsProvider>) -> Result<Self> {
        Self::new(config.providers.clone(), secrets)
    }

    /// Parse and check the embedded `providers.json`
    pub fn embedded_entries() -> Result<Vec<RegistryEntry>> {
        let data = include_str!("providers.json");
        let entries: Vec<RegistryEntry> = serde_json::from_str(data)?;

        for provider in Provider::ALL {
            let count = entries.iter().filter(|e| e.id == provider).count();
            if count != 1 {
                return Err(ConnectError::config(format!(
                    "provider registry must contain exactly one '{}' entry, found {}",
                    provider, count
                )));
            }
        }

        Ok(entries)
    }

    /// All registry entries, in registry order
    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Registry entry for a provider
    pub fn entry(&self, provider: Provider) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.id == provider)
    }

    /// Resolve a provider identifier into its configuration.
    ///
    /// Fails with [`ConnectError::UnknownProvider`] if the identifier is not registered.
    pub async fn get_config(&self, provider: &str) -> Result<ProviderConfig> {
        let provider: Provider = provider.parse()?;
        self.resolve(provider).await
    }

    /// Resolve every registered provider
    pub async fn list_configs(&self) -> Result<Vec<ProviderConfig>> {
        let mut configs = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            configs.push(self.resolve(entry.id).await?);
        }
        Ok(configs)
    }

    /// Resolve a registered provider into its configuration
    pub async fn resolve(&self, provider: Provider) -> Result<ProviderConfig> {
        let entry = self
            .entry(provider)
            .ok_or_else(|| ConnectError::UnknownProvider(provider.to_string()))?
            .clone();
        let overrides = self.overrides.get(provider.as_str());

        let authorize_endpoint = self
            .override_or(
                overrides.and_then(|o| o.authorize_endpoint.as_deref()),
                entry.authorize_endpoint,
            )
            .await?;
        let token_endpoint = self
            .override_or(
                overrides.and_then(|o| o.token_endpoint.as_deref()),
                entry.token_endpoint,
            )
            .await?;
        let api_base_url = self
            .override_or(
                overrides.and_then(|o| o.api_base_url.as_deref()),
                entry.api_base_url,
            )
            .await?;

        let client_id = self
            .credential(
                overrides.and_then(|o| o.client_id.as_deref()),
                Some(entry.client_id_env_key.as_str()),
            )
            .await?;
        let client_secret = self
            .credential(
                overrides.and_then(|o| o.client_secret.as_deref()),
                entry.client_secret_env_key.as_deref(),
            )
            .await?;

        if client_id.is_none() {
            tracing::debug!(
                provider = %provider,
                env_key = %entry.client_id_env_key,
                "No OAuth client id configured"
            );
        }

        Ok(ProviderConfig {
            provider,
            name: entry.name,
            authorize_endpoint,
            token_endpoint,
            api_base_url,
            scopes: entry.scopes,
            scope_separator: entry.scope_separator,
            extra_params: entry.extra_params,
            client_id_env_key: entry.client_id_env_key,
            identity: entry.identity,
            client_id,
            client_secret,
        })
    }

    async fn override_or(&self, value: Option<&str>, default: String) -> Result<String> {
        match value {
            Some(value) => expand_value(value, &self.secrets).await,
            None => Ok(default),
        }
    }

    /// Config value first, then the registry's env key.
    ///
    /// Unresolved `$env:` references count as missing.
    async fn credential(
        &self,
        configured: Option<&str>,
        env_key: Option<&str>,
    ) -> Result<Option<String>> {
        let value = match configured {
            Some(value) => Some(expand_value(value, &self.secrets).await?),
            None => match env_key {
                Some(key) => self.secrets.get_secret(key).await?,
                None => None,
            },
        };

        Ok(value.filter(|v| !v.is_empty() && !v.contains("$env:")))
    }
}
