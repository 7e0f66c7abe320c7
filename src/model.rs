//! Core data models for PM33 Connect
//!
//! This module contains the records that flow through an OAuth connection:
//! pending authorization flows, the token and identity data returned by providers,
//! and the durable [`Integration`] record read by sync jobs and the UI.
//!
//! Integrations serialize in camelCase because external consumers read
//! `authentication.accessToken` and `settings` directly.

use crate::constants::{DISPLAY_NAME_SEPARATOR, TOKEN_REFRESH_BUFFER_SECS};
use crate::{ConnectError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Supported external PM tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Jira,
    Linear,
    Monday,
    Asana,
}

impl Provider {
    /// Every supported provider, in registry order
    pub const ALL: [Provider; 4] = [
        Provider::Jira,
        Provider::Linear,
        Provider::Monday,
        Provider::Asana,
    ];

    /// Stable identifier used in URLs, config keys and storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Jira => "jira",
            Provider::Linear => "linear",
            Provider::Monday => "monday",
            Provider::Asana => "asana",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ConnectError;

    fn from_str(s: &str) -> Result<Self> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConnectError::UnknownProvider(s.to_string()))
    }
}

/// An in-flight authorization attempt, keyed by its state token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingFlow {
    /// Anti-CSRF state token, unique per flow
    pub state: String,

    /// Provider this flow targets
    pub provider: Provider,

    /// PKCE verifier, only ever sent in the token exchange
    pub code_verifier: String,

    /// Start of the TTL clock
    pub created_at: DateTime<Utc>,
}

impl PendingFlow {
    /// Whether this flow is older than `ttl` at `now`
    #[must_use]
    pub fn is_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.created_at >= ttl
    }
}

/// Tokens returned by a provider's token endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Lifetime of the access token in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Minimal account/workspace identity looked up after a token exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub workspace_name: String,
    pub base_url: String,
    pub workspace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_keys: Option<Vec<String>>,
}

/// Durable record of a completed connection to an external PM tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    /// Unique identifier
    pub id: String,

    /// Connected provider
    pub provider: Provider,

    /// Human-readable label, e.g. "Jira – Acme"
    pub display_name: String,

    /// Credentials used by sync jobs
    pub authentication: Authentication,

    /// Provider-specific configuration
    pub settings: IntegrationSettings,

    /// Lifecycle state
    pub status: IntegrationStatus,

    /// Created by the simulated (demo) adapter; never refreshed
    #[serde(default)]
    pub simulated: bool,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Authentication method of an integration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    #[serde(rename = "oauth2")]
    OAuth2,
    ApiToken,
}

/// Credentials of an integration.
///
/// Written whole at creation and replaced whole on refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authentication {
    pub method: AuthMethod,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub validated: bool,
}

impl Authentication {
    /// Build OAuth2 credentials from a token response received at `now`
    pub fn from_tokens(provider: Provider, tokens: TokenSet, now: DateTime<Utc>) -> Result<Self> {
        let access_token = tokens
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConnectError::NoAccessToken(provider.to_string()))?;

        Ok(Self {
            method: AuthMethod::OAuth2,
            access_token,
            refresh_token: tokens.refresh_token.filter(|t| !t.is_empty()),
            // Out-of-range lifetimes are treated as unknown
            expires_at: tokens
                .expires_in
                .filter(|secs| *secs > 0)
                .and_then(Duration::try_seconds)
                .and_then(|lifetime| now.checked_add_signed(lifetime)),
            validated: true,
        })
    }

    /// Check if the access token is expired
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Utc::now() >= expires_at)
    }

    /// Check if the access token expires within the refresh buffer
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| {
            Utc::now() + Duration::seconds(TOKEN_REFRESH_BUFFER_SECS) >= expires_at
        })
    }
}

/// How often downstream sync jobs pull from the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncFrequency {
    Realtime,
    #[default]
    Hourly,
    Daily,
    Manual,
}

/// Maps a provider field onto a PM33 field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub source_field: String,
    pub target_field: String,
}

/// Restricts which provider items are synced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationFilters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issue_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

/// Provider-specific integration configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSettings {
    pub base_url: String,
    pub workspace_id: String,
    #[serde(default)]
    pub project_keys: Vec<String>,
    #[serde(default)]
    pub sync_frequency: SyncFrequency,
    #[serde(default)]
    pub field_mappings: Vec<FieldMapping>,
    #[serde(default)]
    pub filters: IntegrationFilters,
}

/// Integration lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationStatus {
    Pending,
    Ready,
    Error,
    Disabled,
}

impl IntegrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationStatus::Pending => "pending",
            IntegrationStatus::Ready => "ready",
            IntegrationStatus::Error => "error",
            IntegrationStatus::Disabled => "disabled",
        }
    }
}

// Validation macro for required fields
macro_rules! require_field {
    ($field:expr, $name:literal) => {
        if $field.is_empty() {
            return Err(ConnectError::validation(concat!($name, " is required")));
        }
    };
}

impl Integration {
    /// Assemble a ready integration from a successful exchange and identity lookup
    pub fn connected(
        provider: Provider,
        provider_name: &str,
        tokens: TokenSet,
        identity: Identity,
        simulated: bool,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let authentication = Authentication::from_tokens(provider, tokens, now)?;

        let integration = Self {
            id: Uuid::new_v4().to_string(),
            provider,
            display_name: format!(
                "{}{}{}",
                provider_name, DISPLAY_NAME_SEPARATOR, identity.workspace_name
            ),
            authentication,
            settings: IntegrationSettings {
                base_url: identity.base_url,
                workspace_id: identity.workspace_id,
                project_keys: identity.project_keys.unwrap_or_default(),
                sync_frequency: SyncFrequency::default(),
                field_mappings: Vec::new(),
                filters: IntegrationFilters::default(),
            },
            status: IntegrationStatus::Ready,
            simulated,
            created_at: now,
        };
        integration.validate()?;
        Ok(integration)
    }

    /// Validate the integration record
    pub fn validate(&self) -> Result<()> {
        require_field!(self.id, "id");
        require_field!(self.display_name, "displayName");
        require_field!(self.authentication.access_token, "authentication.accessToken");
        require_field!(self.settings.workspace_id, "settings.workspaceId");
        if self.status == IntegrationStatus::Ready && !self.authentication.validated {
            return Err(ConnectError::validation(
                "a ready integration must have validated credentials",
            ));
        }
        Ok(())
    }
}

/// Integration as shown to the UI, without token material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSummary {
    pub id: String,
    pub provider: Provider,
    pub display_name: String,
    pub auth_method: AuthMethod,
    pub validated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub settings: IntegrationSettings,
    pub status: IntegrationStatus,
    pub simulated: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Integration> for IntegrationSummary {
    fn from(integration: &Integration) -> Self {
        Self {
            id: integration.id.clone(),
            provider: integration.provider,
            display_name: integration.display_name.clone(),
            auth_method: integration.authentication.method,
            validated: integration.authentication.validated,
            expires_at: integration.authentication.expires_at,
            settings: integration.settings.clone(),
            status: integration.status,
            simulated: integration.simulated,
            created_at: integration.created_at,
        }
    }
}
