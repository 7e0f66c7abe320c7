//! Simulated (demo) adapter
//!
//! Serves providers without a real client registration. Connections complete
//! locally with clearly marked `demo_` tokens and a demo workspace; nothing is
//! sent over the network.

use super::ProviderAdapter;
use crate::model::{Identity, TokenSet};
use crate::registry::ProviderConfig;
use crate::{ConnectError, Result};
use async_trait::async_trait;
use uuid::Uuid;

pub struct SimulatedAdapter {
    config: ProviderConfig,
}

impl SimulatedAdapter {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    fn demo_token(&self, kind: &str) -> String {
        format!(
            "demo_{}_{}_{}",
            kind,
            self.config.provider,
            Uuid::new_v4().simple()
        )
    }
}

#[async_trait]
impl ProviderAdapter for SimulatedAdapter {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn is_simulated(&self) -> bool {
        true
    }

    fn build_authorize_url(&self, _state: &str, _code_challenge: &str) -> Result<String> {
        Err(ConnectError::config(format!(
            "{} is simulated and has no authorize endpoint",
            self.config.provider
        )))
    }

    async fn exchange_token(&self, _code: &str, _code_verifier: &str) -> Result<TokenSet> {
        Ok(TokenSet {
            access_token: Some(self.demo_token("access")),
            refresh_token: Some(self.demo_token("refresh")),
            expires_in: None,
            scope: Some(self.config.scope_param()),
        })
    }

    async fn fetch_identity(&self, _access_token: &str) -> Result<Identity> {
        Ok(Identity {
            workspace_name: "Demo Workspace".to_string(),
            base_url: self.config.api_base_url.clone(),
            workspace_id: format!("demo-{}", self.config.provider),
            project_keys: Some(vec!["DEMO".to_string()]),
        })
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenSet> {
        self.exchange_token("", "").await
    }
}
