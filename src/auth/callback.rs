//! Callback handler
//!
//! Completes a connection when the provider redirects back with `code` and
//! `state`. The pending flow is consumed before anything else happens, so every
//! path (success or failure) leaves it deleted and a code can never be retried
//! through the same state.

use super::complete_connection;
use crate::constants::DEFAULT_FLOW_TTL_SECS;
use crate::model::{Integration, Provider};
use crate::providers::ProviderDirectory;
use crate::storage::{IntegrationStore, PendingFlowStore};
use crate::{ConnectError, Result, telemetry};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Query parameters of a provider redirect
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Structured result reported to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackOutcome {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<Integration>,

    /// Stable error code, e.g. "InvalidState"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// User-facing message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CallbackOutcome {
    pub fn success(integration: Integration) -> Self {
        Self {
            success: true,
            integration: Some(integration),
            error: None,
            message: None,
        }
    }

    pub fn failure(error: &ConnectError) -> Self {
        Self {
            success: false,
            integration: None,
            error: Some(error.code().to_string()),
            message: Some(error.user_message()),
        }
    }
}

impl From<Result<Integration>> for CallbackOutcome {
    fn from(result: Result<Integration>) -> Self {
        match result {
            Ok(integration) => Self::success(integration),
            Err(e) => Self::failure(&e),
        }
    }
}

pub struct CallbackHandler {
    directory: Arc<ProviderDirectory>,
    pending_flows: Arc<dyn PendingFlowStore>,
    integrations: Arc<dyn IntegrationStore>,
    flow_ttl: Duration,
}

impl CallbackHandler {
    pub fn new(
        directory: Arc<ProviderDirectory>,
        pending_flows: Arc<dyn PendingFlowStore>,
        integrations: Arc<dyn IntegrationStore>,
    ) -> Self {
        Self {
            directory,
            pending_flows,
            integrations,
            flow_ttl: Duration::seconds(DEFAULT_FLOW_TTL_SECS as i64),
        }
    }

    /// Lifetime of a pending flow
    pub fn with_flow_ttl(mut self, ttl: Duration) -> Self {
        self.flow_ttl = ttl;
        self
    }

    /// Complete the flow identified by `state` with the provider's authorization code
    pub async fn handle_callback(
        &self,
        provider: &str,
        code: &str,
        state: &str,
    ) -> Result<Integration> {
        let result = self.complete(provider, code, state).await;
        record_outcome(provider, &result);
        result
    }

    /// Handle a raw provider redirect, including `error=` redirects
    pub async fn handle_redirect(&self, provider: &str, params: CallbackParams) -> CallbackOutcome {
        let result = match (params.error, params.state, params.code) {
            (Some(error), state, _) => {
                self.deny(provider, state.as_deref(), &error, params.error_description)
                    .await
            }
            (None, Some(state), Some(code)) => self.complete(provider, &code, &state).await,
            (None, Some(state), None) => {
                self.deny(provider, Some(&state), "missing_code", None).await
            }
            (None, None, _) => {
                tracing::warn!(provider = %provider, "OAuth callback without state");
                Err(ConnectError::InvalidState)
            }
        };

        record_outcome(provider, &result);
        result.into()
    }

    async fn complete(&self, provider: &str, code: &str, state: &str) -> Result<Integration> {
        // Consume first: a second callback for this state must fail
        let flow = self
            .pending_flows
            .take_pending_flow(state)
            .await?
            .ok_or_else(|| {
                tracing::warn!(provider = %provider, "OAuth callback with unknown or reused state");
                ConnectError::InvalidState
            })?;

        if flow.is_expired_at(self.flow_ttl, Utc::now()) {
            tracing::warn!(provider = %flow.provider, "OAuth callback for expired flow");
            return Err(ConnectError::InvalidState);
        }

        let provider: Provider = provider.parse()?;
        if flow.provider != provider {
            tracing::warn!(
                expected = %flow.provider,
                received = %provider,
                "OAuth callback provider does not match flow"
            );
            return Err(ConnectError::InvalidState);
        }

        let adapter = self.directory.get(provider)?;
        let integration = complete_connection(adapter.as_ref(), code, &flow.code_verifier).await?;

        self.integrations
            .save_integration(&integration)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to save integration"))?;

        tracing::info!(
            provider = %provider,
            integration_id = %integration.id,
            workspace_id = %integration.settings.workspace_id,
            "OAuth connection completed"
        );

        Ok(integration)
    }

    async fn deny(
        &self,
        provider: &str,
        state: Option<&str>,
        error: &str,
        description: Option<String>,
    ) -> Result<Integration> {
        if let Some(state) = state {
            self.pending_flows.delete_pending_flow(state).await?;
        }

        tracing::warn!(
            provider = %provider,
            error = %error,
            description = description.as_deref().unwrap_or(""),
            "Provider redirected back without authorization"
        );

        Err(ConnectError::AuthorizationDenied(error.to_string()))
    }
}

fn record_outcome(provider: &str, result: &Result<Integration>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) => e.code(),
    };
    // Path segments are untrusted; keep label cardinality bounded
    let label = provider
        .parse::<Provider>()
        .map(|p| p.as_str())
        .unwrap_or("unknown");
    telemetry::record_callback(label, outcome);
}
