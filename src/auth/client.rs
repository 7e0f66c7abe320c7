//! OAuth client for integration consumers
//!
//! Sync jobs ask for an integration's access token here instead of reading the
//! stored credentials directly, so tokens close to expiry are refreshed first.

use crate::model::{Authentication, Integration, IntegrationStatus};
use crate::providers::ProviderDirectory;
use crate::storage::IntegrationStore;
use crate::{ConnectError, Result, telemetry};
use chrono::Utc;
use std::sync::Arc;

/// Hands out access tokens and refreshes them through the provider
#[derive(Clone)]
pub struct OAuthClientManager {
    directory: Arc<ProviderDirectory>,
    integrations: Arc<dyn IntegrationStore>,
}

impl OAuthClientManager {
    pub fn new(
        directory: Arc<ProviderDirectory>,
        integrations: Arc<dyn IntegrationStore>,
    ) -> Self {
        Self {
            directory,
            integrations,
        }
    }

    /// Get a usable access token for an integration, refreshing it if it
    /// expires within the refresh buffer.
    ///
    /// Simulated integrations are never refreshed.
    pub async fn get_access_token(&self, integration_id: &str) -> Result<String> {
        let integration = self
            .integrations
            .get_integration(integration_id)
            .await?
            .ok_or_else(|| {
                ConnectError::validation(format!("Integration {} not found", integration_id))
            })?;

        if integration.simulated || !integration.authentication.needs_refresh() {
            return Ok(integration.authentication.access_token);
        }

        let Some(refresh_token) = integration.authentication.refresh_token.clone() else {
            tracing::warn!(
                provider = %integration.provider,
                integration_id = %integration.id,
                "Access token is expiring and no refresh token is stored"
            );
            return Ok(integration.authentication.access_token);
        };

        self.refresh(&integration, &refresh_token).await
    }

    async fn refresh(&self, integration: &Integration, refresh_token: &str) -> Result<String> {
        let provider = integration.provider;
        let adapter = self.directory.get(provider)?;

        if adapter.is_simulated() {
            tracing::debug!(
                provider = %provider,
                "Provider is running simulated; returning stored token"
            );
            return Ok(integration.authentication.access_token.clone());
        }

        let refreshed = match adapter.refresh_token(refresh_token).await {
            Ok(tokens) => Authentication::from_tokens(provider, tokens, Utc::now()),
            Err(e) => Err(e),
        };

        match refreshed {
            Ok(mut authentication) => {
                // Providers that don't rotate refresh tokens omit them from the response
                if authentication.refresh_token.is_none() {
                    authentication.refresh_token = Some(refresh_token.to_string());
                }

                self.integrations
                    .update_integration_credentials(&integration.id, &authentication)
                    .await?;
                if integration.status == IntegrationStatus::Error {
                    self.integrations
                        .set_integration_status(&integration.id, IntegrationStatus::Ready)
                        .await?;
                }

                telemetry::record_token_refresh(provider.as_str(), "success");
                tracing::info!(
                    provider = %provider,
                    integration_id = %integration.id,
                    "Access token refreshed"
                );

                Ok(authentication.access_token)
            }
            Err(e) => {
                telemetry::record_token_refresh(provider.as_str(), "failure");
                tracing::warn!(
                    provider = %provider,
                    integration_id = %integration.id,
                    error = %e,
                    "Token refresh failed; marking integration as error"
                );

                self.integrations
                    .set_integration_status(&integration.id, IntegrationStatus::Error)
                    .await?;

                Err(match e {
                    ConnectError::NoAccessToken(provider) => ConnectError::TokenExchangeFailed {
                        provider,
                        status: None,
                        body: "refresh response did not contain an access token".to_string(),
                    },
                    other => other,
                })
            }
        }
    }
}
