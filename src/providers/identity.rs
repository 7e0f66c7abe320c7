//! Workspace identity lookups
//!
//! After a token exchange each provider is asked which workspace the token
//! belongs to. The calls differ per provider (REST resource lists, GraphQL
//! viewer queries) but all produce an [`Identity`].

use crate::model::{Identity, Provider};
use crate::registry::IdentityStrategy;
use crate::{ConnectError, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Provider-specific identity lookup
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(
        &self,
        http: &reqwest::Client,
        provider: Provider,
        api_base_url: &str,
        access_token: &str,
    ) -> Result<Identity>;
}

/// Table of identity resolvers keyed by strategy
#[derive(Clone)]
pub struct IdentityResolvers {
    resolvers: HashMap<IdentityStrategy, Arc<dyn IdentityResolver>>,
}

impl Default for IdentityResolvers {
    fn default() -> Self {
        let mut resolvers: HashMap<IdentityStrategy, Arc<dyn IdentityResolver>> = HashMap::new();
        resolvers.insert(
            IdentityStrategy::AtlassianAccessibleResources,
            Arc::new(AtlassianResolver),
        );
        resolvers.insert(IdentityStrategy::LinearViewer, Arc::new(LinearResolver));
        resolvers.insert(IdentityStrategy::MondayMe, Arc::new(MondayResolver));
        resolvers.insert(IdentityStrategy::AsanaWorkspaces, Arc::new(AsanaResolver));
        Self { resolvers }
    }
}

impl IdentityResolvers {
    pub fn get(&self, strategy: IdentityStrategy) -> Result<Arc<dyn IdentityResolver>> {
        self.resolvers.get(&strategy).cloned().ok_or_else(|| {
            ConnectError::config(format!("No identity resolver for {:?}", strategy))
        })
    }
}

/// Send an authenticated request and decode its JSON body
async fn fetch_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    provider: Provider,
    access_token: &str,
) -> Result<T> {
    let response = request
        .bearer_auth(access_token)
        .header(ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| {
            tracing::warn!(provider = %provider, error = %e, "Identity request failed");
            ConnectError::identity(provider, e.to_string())
        })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ConnectError::identity(provider, e.to_string()))?;

    if !status.is_success() {
        tracing::warn!(
            provider = %provider,
            status = status.as_u16(),
            body = %body,
            "Identity endpoint returned an error"
        );
        return Err(ConnectError::identity(
            provider,
            format!("HTTP {}", status.as_u16()),
        ));
    }

    serde_json::from_str(&body).map_err(|e| {
        tracing::warn!(provider = %provider, error = %e, "Unexpected identity response");
        ConnectError::identity(provider, format!("unexpected response: {}", e))
    })
}

fn endpoint(api_base_url: &str, path: &str) -> String {
    format!("{}{}", api_base_url.trim_end_matches('/'), path)
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

impl<T> GraphQlResponse<T> {
    fn into_data(self, provider: Provider) -> Result<T> {
        if let Some(first) = self.errors.first() {
            tracing::warn!(
                provider = %provider,
                error = %first.message,
                "GraphQL identity query failed"
            );
            return Err(ConnectError::identity(provider, first.message.clone()));
        }
        self.data
            .ok_or_else(|| ConnectError::identity(provider, "GraphQL response has no data"))
    }
}

// ----------------------------------------------------------------------------
// Jira (Atlassian)
// ----------------------------------------------------------------------------

/// First site from `accessible-resources`, plus its project keys
pub struct AtlassianResolver;

#[derive(Debug, Deserialize)]
struct AtlassianResource {
    id: String,
    name: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct AtlassianProjectPage {
    #[serde(default)]
    values: Vec<AtlassianProject>,
}

#[derive(Debug, Deserialize)]
struct AtlassianProject {
    key: String,
}

#[async_trait]
impl IdentityResolver for AtlassianResolver {
    async fn resolve(
        &self,
        http: &reqwest::Client,
        provider: Provider,
        api_base_url: &str,
        access_token: &str,
    ) -> Result<Identity> {
        let resources: Vec<AtlassianResource> = fetch_json(
            http.get(endpoint(api_base_url, "/oauth/token/accessible-resources")),
            provider,
            access_token,
        )
        .await?;

        let site = resources
            .into_iter()
            .next()
            .ok_or_else(|| ConnectError::identity(provider, "no accessible Jira sites"))?;

        // Project keys are optional; a failed listing does not fail the connection
        let project_keys = match fetch_json::<AtlassianProjectPage>(
            http.get(endpoint(
                api_base_url,
                &format!("/ex/jira/{}/rest/api/3/project/search", site.id),
            ))
            .query(&[("maxResults", "50")]),
            provider,
            access_token,
        )
        .await
        {
            Ok(page) => Some(page.values.into_iter().map(|p| p.key).collect()),
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "Could not list Jira projects");
                None
            }
        };

        Ok(Identity {
            workspace_name: site.name,
            base_url: site.url,
            workspace_id: site.id,
            project_keys,
        })
    }
}

// ----------------------------------------------------------------------------
// Linear
// ----------------------------------------------------------------------------

/// GraphQL `viewer.organization` and team keys
pub struct LinearResolver;

const LINEAR_VIEWER_QUERY: &str =
    "query { viewer { id organization { id name urlKey } } teams { nodes { key } } }";

#[derive(Debug, Deserialize)]
struct LinearData {
    viewer: LinearViewer,
    teams: Option<LinearTeams>,
}

#[derive(Debug, Deserialize)]
struct LinearViewer {
    organization: LinearOrganization,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinearOrganization {
    id: String,
    name: String,
    url_key: String,
}

#[derive(Debug, Deserialize)]
struct LinearTeams {
    nodes: Vec<LinearTeam>,
}

#[derive(Debug, Deserialize)]
struct LinearTeam {
    key: String,
}

#[async_trait]
impl IdentityResolver for LinearResolver {
    async fn resolve(
        &self,
        http: &reqwest::Client,
        provider: Provider,
        api_base_url: &str,
        access_token: &str,
    ) -> Result<Identity> {
        let response: GraphQlResponse<LinearData> = fetch_json(
            http.post(endpoint(api_base_url, "/graphql"))
                .json(&json!({ "query": LINEAR_VIEWER_QUERY })),
            provider,
            access_token,
        )
        .await?;
        let data = response.into_data(provider)?;
        let organization = data.viewer.organization;

        Ok(Identity {
            workspace_name: organization.name,
            base_url: format!("https://linear.app/{}", organization.url_key),
            workspace_id: organization.id,
            project_keys: data
                .teams
                .map(|teams| teams.nodes.into_iter().map(|t| t.key).collect()),
        })
    }
}

// ----------------------------------------------------------------------------
// Monday.com
// ----------------------------------------------------------------------------

/// GraphQL `me.account`
pub struct MondayResolver;

const MONDAY_ME_QUERY: &str = "query { me { id account { id name slug } } }";

#[derive(Debug, Deserialize)]
struct MondayData {
    me: MondayMe,
}

#[derive(Debug, Deserialize)]
struct MondayMe {
    account: MondayAccount,
}

#[derive(Debug, Deserialize)]
struct MondayAccount {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    name: String,
    slug: String,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

#[async_trait]
impl IdentityResolver for MondayResolver {
    async fn resolve(
        &self,
        http: &reqwest::Client,
        provider: Provider,
        api_base_url: &str,
        access_token: &str,
    ) -> Result<Identity> {
        let response: GraphQlResponse<MondayData> = fetch_json(
            http.post(endpoint(api_base_url, "/v2"))
                .json(&json!({ "query": MONDAY_ME_QUERY })),
            provider,
            access_token,
        )
        .await?;
        let account = response.into_data(provider)?.me.account;

        Ok(Identity {
            workspace_name: account.name,
            base_url: format!("https://{}.monday.com", account.slug),
            workspace_id: account.id,
            project_keys: None,
        })
    }
}

// ----------------------------------------------------------------------------
// Asana
// ----------------------------------------------------------------------------

/// First workspace of `users/me`
pub struct AsanaResolver;

#[derive(Debug, Deserialize)]
struct AsanaEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct AsanaUser {
    #[serde(default)]
    workspaces: Vec<AsanaWorkspace>,
}

#[derive(Debug, Deserialize)]
struct AsanaWorkspace {
    gid: String,
    name: String,
}

#[async_trait]
impl IdentityResolver for AsanaResolver {
    async fn resolve(
        &self,
        http: &reqwest::Client,
        provider: Provider,
        api_base_url: &str,
        access_token: &str,
    ) -> Result<Identity> {
        let user: AsanaEnvelope<AsanaUser> = fetch_json(
            http.get(endpoint(api_base_url, "/users/me"))
                .query(&[("opt_fields", "workspaces.name")]),
            provider,
            access_token,
        )
        .await?;

        let workspace =
            user.data.workspaces.into_iter().next().ok_or_else(|| {
                ConnectError::identity(provider, "no Asana workspaces for this user")
            })?;

        Ok(Identity {
            base_url: format!("https://app.asana.com/0/{}", workspace.gid),
            workspace_name: workspace.name,
            workspace_id: workspace.gid,
            project_keys: None,
        })
    }
}

#[cfg(test)]
mod identity_test {
    include!("identity_test.rs");
}
