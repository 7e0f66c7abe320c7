//! Live OAuth 2.0 adapter
//!
//! Authorize URLs are built with the `oauth2` crate from the registry entry.
//! Token exchange and refresh are plain form POSTs so a provider's error body
//! and a success response without `access_token` can be told apart.

use super::{IdentityResolver, ProviderAdapter};
use crate::constants::{GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN, PKCE_METHOD_S256};
use crate::model::{Identity, TokenSet};
use crate::registry::ProviderConfig;
use crate::{ConnectError, Result};
use async_trait::async_trait;
use oauth2::{AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope, basic::BasicClient};
use reqwest::header::ACCEPT;
use std::sync::Arc;

/// Adapter for a provider with a real client registration
pub struct OAuth2Adapter {
    config: ProviderConfig,
    client_id: String,
    redirect_uri: String,
    http: reqwest::Client,
    identity: Arc<dyn IdentityResolver>,
}

impl OAuth2Adapter {
    pub fn new(
        config: ProviderConfig,
        redirect_uri: String,
        http: reqwest::Client,
        identity: Arc<dyn IdentityResolver>,
    ) -> Result<Self> {
        let client_id = config
            .client_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                ConnectError::config(format!(
                    "{} has no client id (set {})",
                    config.provider, config.client_id_env_key
                ))
            })?;

        Ok(Self {
            config,
            client_id,
            redirect_uri,
            http,
            identity,
        })
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenSet> {
        let provider = self.config.provider.to_string();

        let response = self
            .http
            .post(&self.config.token_endpoint)
            .header(ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(provider = %provider, error = %e, "Token endpoint request failed");
                ConnectError::TokenExchangeFailed {
                    provider: provider.clone(),
                    status: None,
                    body: e.to_string(),
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            tracing::warn!(provider = %provider, error = %e, "Failed to read token response");
            ConnectError::TokenExchangeFailed {
                provider: provider.clone(),
                status: Some(status.as_u16()),
                body: e.to_string(),
            }
        })?;

        if !status.is_success() {
            tracing::warn!(
                provider = %provider,
                status = status.as_u16(),
                body = %body,
                "Token endpoint returned an error"
            );
            return Err(ConnectError::TokenExchangeFailed {
                provider,
                status: Some(status.as_u16()),
                body,
            });
        }

        // A malformed success response is treated like one without a token
        let tokens: TokenSet = serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(provider = %provider, error = %e, "Unparseable token response");
            ConnectError::NoAccessToken(provider.clone())
        })?;

        if tokens.access_token.as_deref().is_none_or(str::is_empty) {
            tracing::warn!(provider = %provider, "Token response has no access_token");
            return Err(ConnectError::NoAccessToken(provider));
        }

        Ok(tokens)
    }
}

#[async_trait]
impl ProviderAdapter for OAuth2Adapter {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn build_authorize_url(&self, state: &str, code_challenge: &str) -> Result<String> {
        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_auth_uri(
                AuthUrl::new(self.config.authorize_endpoint.clone())
                    .map_err(|e| ConnectError::config(format!("Invalid authorize URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(self.redirect_uri.clone())
                    .map_err(|e| ConnectError::config(format!("Invalid redirect URI: {}", e)))?,
            );

        let state = state.to_string();
        let mut request = client
            .authorize_url(move || CsrfToken::new(state))
            .add_scope(Scope::new(self.config.scope_param()))
            .add_extra_param("code_challenge", code_challenge)
            .add_extra_param("code_challenge_method", PKCE_METHOD_S256);

        for param in &self.config.extra_params {
            request = request.add_extra_param(param.name.as_str(), param.value.as_str());
        }

        let (url, _) = request.url();
        Ok(url.to_string())
    }

    async fn exchange_token(&self, code: &str, code_verifier: &str) -> Result<TokenSet> {
        let mut form = vec![
            ("grant_type", GRANT_AUTHORIZATION_CODE),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        self.token_request(&form).await
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<Identity> {
        self.identity
            .resolve(
                &self.http,
                self.config.provider,
                &self.config.api_base_url,
                access_token,
            )
            .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet> {
        let mut form = vec![
            ("grant_type", GRANT_REFRESH_TOKEN),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        self.token_request(&form).await
    }
}

#[cfg(test)]
mod oauth2_adapter_test {
    include!("oauth2_adapter_test.rs");
}
