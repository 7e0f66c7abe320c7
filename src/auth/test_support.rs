//! Stub provider adapter shared by the auth unit tests

use crate::model::{Identity, Provider, TokenSet};
use crate::providers::{ProviderAdapter, ProviderDirectory};
use crate::registry::{ProviderConfig, ProviderRegistry};
use crate::secrets::StaticSecretsProvider;
use crate::{ConnectError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Scripted token endpoint behaviour
#[derive(Debug, Clone)]
pub(crate) enum TokenReply {
    Tokens(TokenSet),
    HttpError(u16, String),
    MissingAccessToken,
}

/// Scripted identity endpoint behaviour
#[derive(Debug, Clone)]
pub(crate) enum IdentityReply {
    Found(Identity),
    Fails,
}

pub(crate) struct StubAdapter {
    config: ProviderConfig,
    simulated: bool,
    exchange: TokenReply,
    refresh: TokenReply,
    identity: IdentityReply,
    pub exchange_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub last_verifier: Mutex<Option<String>>,
}

impl StubAdapter {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            simulated: false,
            exchange: TokenReply::Tokens(tokens("access-1")),
            refresh: TokenReply::Tokens(tokens("access-2")),
            identity: IdentityReply::Found(identity()),
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            last_verifier: Mutex::new(None),
        }
    }

    pub fn with_exchange(mut self, reply: TokenReply) -> Self {
        self.exchange = reply;
        self
    }

    pub fn with_refresh(mut self, reply: TokenReply) -> Self {
        self.refresh = reply;
        self
    }

    pub fn with_identity(mut self, reply: IdentityReply) -> Self {
        self.identity = reply;
        self
    }

    pub fn simulated(mut self) -> Self {
        self.simulated = true;
        self
    }

    fn reply(&self, reply: &TokenReply) -> Result<TokenSet> {
        match reply {
            TokenReply::Tokens(tokens) => Ok(tokens.clone()),
            TokenReply::HttpError(status, body) => Err(ConnectError::TokenExchangeFailed {
                provider: self.config.provider.to_string(),
                status: Some(*status),
                body: body.clone(),
            }),
            TokenReply::MissingAccessToken => {
                Err(ConnectError::NoAccessToken(self.config.provider.to_string()))
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for StubAdapter {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn is_simulated(&self) -> bool {
        self.simulated
    }

    fn build_authorize_url(&self, state: &str, code_challenge: &str) -> Result<String> {
        Ok(format!(
            "{}?client_id=stub&response_type=code&state={}&code_challenge={}&code_challenge_method=S256",
            self.config.authorize_endpoint, state, code_challenge
        ))
    }

    async fn exchange_token(&self, _code: &str, code_verifier: &str) -> Result<TokenSet> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_verifier.lock() = Some(code_verifier.to_string());
        self.reply(&self.exchange)
    }

    async fn fetch_identity(&self, _access_token: &str) -> Result<Identity> {
        match &self.identity {
            IdentityReply::Found(identity) => Ok(identity.clone()),
            IdentityReply::Fails => Err(ConnectError::identity(
                self.config.provider,
                "HTTP 500",
            )),
        }
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenSet> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.reply(&self.refresh)
    }
}

pub(crate) async fn provider_config(provider: Provider) -> ProviderConfig {
    ProviderRegistry::new(HashMap::new(), Arc::new(StaticSecretsProvider::new()))
        .unwrap()
        .resolve(provider)
        .await
        .unwrap()
}

pub(crate) fn tokens(access: &str) -> TokenSet {
    TokenSet {
        access_token: Some(access.to_string()),
        refresh_token: Some("refresh-1".to_string()),
        expires_in: Some(3600),
        scope: None,
    }
}

pub(crate) fn identity() -> Identity {
    Identity {
        workspace_name: "Acme".to_string(),
        base_url: "https://acme.atlassian.net".to_string(),
        workspace_id: "cloud-1".to_string(),
        project_keys: Some(vec!["PM".to_string()]),
    }
}

pub(crate) fn directory_with(adapter: Arc<StubAdapter>) -> Arc<ProviderDirectory> {
    Arc::new(ProviderDirectory::from_adapters([
        adapter as Arc<dyn ProviderAdapter>
    ]))
}
