//! Authorization initiator
//!
//! Starts an OAuth connection: generates PKCE material and a state token,
//! persists the pending flow and returns the provider's authorize URL.
//! Simulated providers complete immediately instead of redirecting.

use super::complete_connection;
use super::pkce::{PkcePair, generate_state};
use crate::constants::DEFAULT_SIMULATED_DELAY_MS;
use crate::model::{Integration, PendingFlow};
use crate::providers::{AdapterMode, ProviderAdapter, ProviderDirectory};
use crate::storage::{IntegrationStore, PendingFlowStore};
use crate::{Result, telemetry};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// What the UI should do after initiating a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RedirectInstruction {
    /// Send the user agent to the provider's authorize URL
    Redirect { url: String, state: String },

    /// The connection was completed locally; no redirect happens
    Simulated { integration: Integration },
}

pub struct AuthorizationInitiator {
    directory: Arc<ProviderDirectory>,
    pending_flows: Arc<dyn PendingFlowStore>,
    integrations: Arc<dyn IntegrationStore>,
    simulated_delay: Duration,
}

impl AuthorizationInitiator {
    pub fn new(
        directory: Arc<ProviderDirectory>,
        pending_flows: Arc<dyn PendingFlowStore>,
        integrations: Arc<dyn IntegrationStore>,
    ) -> Self {
        Self {
            directory,
            pending_flows,
            integrations,
            simulated_delay: Duration::from_millis(DEFAULT_SIMULATED_DELAY_MS),
        }
    }

    /// Delay before a simulated connection completes
    pub fn with_simulated_delay(mut self, delay: Duration) -> Self {
        self.simulated_delay = delay;
        self
    }

    /// Start a connection to `provider`.
    ///
    /// Unknown providers fail before any state is created.
    pub async fn initiate(&self, provider: &str) -> Result<RedirectInstruction> {
        let adapter = self.directory.lookup(provider)?;

        if adapter.is_simulated() {
            return self.complete_simulated(adapter.as_ref()).await;
        }

        let pkce = PkcePair::generate()?;
        let state = generate_state()?;
        let url = adapter.build_authorize_url(&state, &pkce.challenge)?;

        let flow = PendingFlow {
            state: state.clone(),
            provider: adapter.provider(),
            code_verifier: pkce.verifier,
            created_at: Utc::now(),
        };
        self.pending_flows.put_pending_flow(&flow).await?;

        telemetry::record_flow_initiated(flow.provider.as_str(), AdapterMode::Live.as_str());
        tracing::info!(provider = %flow.provider, "OAuth flow initiated");

        Ok(RedirectInstruction::Redirect { url, state })
    }

    async fn complete_simulated(
        &self,
        adapter: &dyn ProviderAdapter,
    ) -> Result<RedirectInstruction> {
        let provider = adapter.provider();
        telemetry::record_flow_initiated(provider.as_str(), AdapterMode::Simulated.as_str());
        tracing::info!(provider = %provider, "Simulating OAuth connection");

        tokio::time::sleep(self.simulated_delay).await;

        let verifier = PkcePair::generate()?.verifier;
        let integration = complete_connection(adapter, "simulated", &verifier).await?;
        self.integrations.save_integration(&integration).await?;

        tracing::info!(
            provider = %provider,
            integration_id = %integration.id,
            "Simulated integration created"
        );

        Ok(RedirectInstruction::Simulated { integration })
    }
}
