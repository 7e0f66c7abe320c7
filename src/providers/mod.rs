//! Per-provider OAuth strategies
//!
//! Every registered provider is served by a [`ProviderAdapter`]: the live
//! [`OAuth2Adapter`] talks to the provider's real endpoints, the
//! [`SimulatedAdapter`] completes connections locally for demos. The
//! [`ProviderDirectory`] picks one per provider once, at startup, so the
//! initiator and callback handler never branch on provider or mode.

pub mod identity;
pub mod oauth2_adapter;
pub mod simulated;

pub use identity::{IdentityResolver, IdentityResolvers};
pub use oauth2_adapter::OAuth2Adapter;
pub use simulated::SimulatedAdapter;

use crate::config::Config;
use crate::model::{Identity, Provider, TokenSet};
use crate::registry::{ProviderConfig, ProviderRegistry};
use crate::{ConnectError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Uniform capability set of an OAuth provider
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Resolved registry configuration backing this adapter
    fn config(&self) -> &ProviderConfig;

    /// Provider served by this adapter
    fn provider(&self) -> Provider {
        self.config().provider
    }

    /// Whether connections made through this adapter are simulated
    fn is_simulated(&self) -> bool {
        false
    }

    /// Build the URL the user agent is redirected to
    fn build_authorize_url(&self, state: &str, code_challenge: &str) -> Result<String>;

    /// Exchange an authorization code and PKCE verifier for tokens
    async fn exchange_token(&self, code: &str, code_verifier: &str) -> Result<TokenSet>;

    /// Look up the workspace the access token belongs to
    async fn fetch_identity(&self, access_token: &str) -> Result<Identity>;

    /// Obtain a fresh access token from a refresh token
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet>;
}

/// How a provider is currently served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterMode {
    Live,
    Simulated,
}

impl AdapterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterMode::Live => "live",
            AdapterMode::Simulated => "simulated",
        }
    }
}

/// Summary of a provider as exposed to the UI
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSummary {
    pub id: Provider,
    pub name: String,
    pub mode: AdapterMode,
}

/// Lookup table from provider to its adapter
#[derive(Clone, Default)]
pub struct ProviderDirectory {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
    order: Vec<Provider>,
}

impl ProviderDirectory {
    /// Build one adapter per registered provider.
    ///
    /// A provider is simulated when demo mode is on or its client id is missing
    /// or a `demo_` placeholder.
    pub async fn build(registry: &ProviderRegistry, config: &Config) -> Result<Self> {
        let oauth = config.get_oauth();
        let http = build_http_client(oauth.http_timeout())?;
        let resolvers = IdentityResolvers::default();

        let mut directory = Self::default();
        for provider_config in registry.list_configs().await? {
            let provider = provider_config.provider;

            let adapter: Arc<dyn ProviderAdapter> =
                if oauth.demo_mode || !provider_config.has_live_client() {
                    tracing::info!(provider = %provider, "Provider runs in simulated mode");
                    Arc::new(SimulatedAdapter::new(provider_config))
                } else {
                    let resolver = resolvers.get(provider_config.identity)?;
                    Arc::new(OAuth2Adapter::new(
                        provider_config,
                        config.redirect_uri(provider),
                        http.clone(),
                        resolver,
                    )?)
                };

            directory.insert(adapter);
        }

        Ok(directory)
    }

    /// Build a directory from prepared adapters
    pub fn from_adapters(adapters: impl IntoIterator<Item = Arc<dyn ProviderAdapter>>) -> Self {
        let mut directory = Self::default();
        for adapter in adapters {
            directory.insert(adapter);
        }
        directory
    }

    fn insert(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        let provider = adapter.provider();
        if self.adapters.insert(provider, adapter).is_none() {
            self.order.push(provider);
        }
    }

    /// Adapter for a provider
    pub fn get(&self, provider: Provider) -> Result<Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(&provider)
            .cloned()
            .ok_or_else(|| ConnectError::UnknownProvider(provider.to_string()))
    }

    /// Adapter for a provider identifier
    pub fn lookup(&self, provider: &str) -> Result<Arc<dyn ProviderAdapter>> {
        self.get(provider.parse()?)
    }

    /// Providers in registry order with their current mode
    pub fn summaries(&self) -> Vec<ProviderSummary> {
        self.order
            .iter()
            .filter_map(|p| self.adapters.get(p))
            .map(|adapter| ProviderSummary {
                id: adapter.provider(),
                name: adapter.config().name.clone(),
                mode: if adapter.is_simulated() {
                    AdapterMode::Simulated
                } else {
                    AdapterMode::Live
                },
            })
            .collect()
    }
}

/// HTTP client shared by all live adapters.
///
/// Redirects are disabled so authorization codes and tokens are never forwarded.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .user_agent(concat!("pm33-connect/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ConnectError::config(format!("Failed to build HTTP client: {}", e)))
}
