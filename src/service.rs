//! Connection service
//!
//! Wires the provider registry, adapters, stores and flow handlers from a
//! [`Config`]. The HTTP server and the CLI both go through this type.

use crate::Result;
use crate::auth::{
    AuthorizationInitiator, CallbackHandler, CallbackOutcome, CallbackParams, OAuthClientManager,
    RedirectInstruction,
};
use crate::config::Config;
use crate::model::Integration;
use crate::providers::{ProviderDirectory, ProviderSummary};
use crate::registry::{ProviderConfig, ProviderRegistry};
use crate::secrets::{EnvSecretsProvider, SecretsProvider};
use crate::storage::{Stores, create_storage_from_config, spawn_pending_flow_sweeper};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Everything needed to run OAuth connections
#[derive(Clone)]
pub struct ConnectService {
    config: Arc<Config>,
    registry: Arc<ProviderRegistry>,
    directory: Arc<ProviderDirectory>,
    stores: Stores,
    initiator: Arc<AuthorizationInitiator>,
    callback: Arc<CallbackHandler>,
    client: Arc<OAuthClientManager>,
}

impl ConnectService {
    /// Build the service with credentials read from the environment
    pub async fn from_config(config: &Config) -> Result<Self> {
        let stores = create_storage_from_config(&config.storage).await?;
        Self::from_parts(config.clone(), Arc::new(EnvSecretsProvider::new()), stores).await
    }

    /// Build the service from explicit secrets and stores
    pub async fn from_parts(
        config: Config,
        secrets: Arc<dyn SecretsProvider>,
        stores: Stores,
    ) -> Result<Self> {
        config.validate()?;
        let oauth = config.get_oauth();

        let registry = Arc::new(ProviderRegistry::from_config(&oauth, secrets)?);
        let directory = Arc::new(ProviderDirectory::build(&registry, &config).await?);

        let initiator = AuthorizationInitiator::new(
            directory.clone(),
            stores.pending_flows.clone(),
            stores.integrations.clone(),
        )
        .with_simulated_delay(oauth.simulated_delay());

        let callback = CallbackHandler::new(
            directory.clone(),
            stores.pending_flows.clone(),
            stores.integrations.clone(),
        )
        .with_flow_ttl(oauth.flow_ttl());

        let client = OAuthClientManager::new(directory.clone(), stores.integrations.clone());

        tracing::debug!(
            driver = %config.storage.driver,
            demo_mode = oauth.demo_mode,
            "Connect service ready"
        );

        Ok(Self {
            config: Arc::new(config),
            registry,
            directory,
            stores,
            initiator: Arc::new(initiator),
            callback: Arc::new(callback),
            client: Arc::new(client),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Supported providers with their live/simulated mode
    pub fn providers(&self) -> Vec<ProviderSummary> {
        self.directory.summaries()
    }

    /// Resolved configuration of a provider
    pub async fn provider_config(&self, provider: &str) -> Result<ProviderConfig> {
        self.registry.get_config(provider).await
    }

    /// Start a connection
    pub async fn initiate(&self, provider: &str) -> Result<RedirectInstruction> {
        self.initiator.initiate(provider).await
    }

    /// Complete a connection from a code and state
    pub async fn handle_callback(
        &self,
        provider: &str,
        code: &str,
        state: &str,
    ) -> Result<Integration> {
        self.callback.handle_callback(provider, code, state).await
    }

    /// Complete a connection from raw redirect parameters
    pub async fn handle_redirect(&self, provider: &str, params: CallbackParams) -> CallbackOutcome {
        self.callback.handle_redirect(provider, params).await
    }

    pub async fn list_integrations(&self) -> Result<Vec<Integration>> {
        self.stores.integrations.list_integrations().await
    }

    pub async fn get_integration(&self, id: &str) -> Result<Option<Integration>> {
        self.stores.integrations.get_integration(id).await
    }

    /// Remove an integration; removing a missing id is not an error
    pub async fn remove_integration(&self, id: &str) -> Result<()> {
        self.stores.integrations.remove_integration(id).await?;
        tracing::info!(integration_id = %id, "Integration removed");
        Ok(())
    }

    /// Usable access token for an integration, refreshed if close to expiry
    pub async fn get_access_token(&self, integration_id: &str) -> Result<String> {
        self.client.get_access_token(integration_id).await
    }

    /// Start the background sweep of abandoned pending flows
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let oauth = self.config.get_oauth();
        spawn_pending_flow_sweeper(
            self.stores.pending_flows.clone(),
            oauth.flow_ttl(),
            oauth.sweep_interval(),
        )
    }
}
