//! End-to-end tests of the OAuth connection flow
//!
//! Provider endpoints are served by wiremock; credentials come from config
//! overrides, never from the real environment.

use chrono::{Duration, Utc};
use pm33_connect::auth::{CallbackParams, RedirectInstruction};
use pm33_connect::config::{Config, OAuthConfig, ProviderOverride, StorageConfig};
use pm33_connect::model::{IntegrationStatus, PendingFlow, Provider};
use pm33_connect::secrets::StaticSecretsProvider;
use pm33_connect::storage::{IntegrationStore, PendingFlowStore, SqliteStorage, Stores};
use pm33_connect::{ConnectError, ConnectService};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn jira_config(server: &MockServer, demo_mode: bool) -> Config {
    let mut providers = HashMap::new();
    providers.insert(
        "jira".to_string(),
        ProviderOverride {
            client_id: Some("jira-client".to_string()),
            client_secret: Some("jira-secret".to_string()),
            token_endpoint: Some(format!("{}/oauth/token", server.uri())),
            api_base_url: Some(server.uri()),
            ..ProviderOverride::default()
        },
    );

    Config {
        storage: StorageConfig {
            driver: "memory".to_string(),
            dsn: String::new(),
        },
        oauth: Some(OAuthConfig {
            demo_mode,
            simulated_delay_ms: 0,
            http_timeout_secs: 2,
            providers,
            ..OAuthConfig::default()
        }),
        ..Config::default()
    }
}

async fn service_for(config: Config, stores: Stores) -> ConnectService {
    ConnectService::from_parts(config, Arc::new(StaticSecretsProvider::new()), stores)
        .await
        .unwrap()
}

async fn mount_jira_identity(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/oauth/token/accessible-resources"))
        .and(header("authorization", "Bearer jira-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "cloud-1",
                "name": "Acme",
                "url": "https://acme.atlassian.net",
                "scopes": ["read:jira-work"]
            }
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/ex/jira/cloud-1/rest/api/3/project/search"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "values": [{ "key": "PM" }] })),
        )
        .mount(server)
        .await;
}

async fn initiate_redirect(service: &ConnectService) -> (String, String) {
    match service.initiate("jira").await.unwrap() {
        RedirectInstruction::Redirect { url, state } => (url, state),
        other => panic!("expected a redirect, got {other:?}"),
    }
}

#[tokio::test]
async fn test_full_connection_flow() {
    let server = MockServer::start().await;
    let service = service_for(jira_config(&server, false), Stores::in_memory()).await;

    let (url, state) = initiate_redirect(&service).await;
    assert!(url.contains("code_challenge_method=S256"));
    assert!(url.contains(&format!("state={}", state)));

    let flow = service
        .stores()
        .pending_flows
        .get_pending_flow(&state)
        .await
        .unwrap()
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc"))
        .and(body_string_contains(format!("code_verifier={}", flow.code_verifier)))
        .and(body_string_contains("client_secret=jira-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "jira-access",
            "refresh_token": "jira-refresh",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_jira_identity(&server).await;

    let integration = service.handle_callback("jira", "abc", &state).await.unwrap();

    assert_eq!(integration.status, IntegrationStatus::Ready);
    assert!(integration.authentication.validated);
    assert_eq!(integration.authentication.access_token, "jira-access");
    assert_eq!(integration.display_name, "Jira – Acme");
    assert_eq!(integration.settings.workspace_id, "cloud-1");
    assert_eq!(integration.settings.project_keys, vec!["PM".to_string()]);
    assert!(!integration.simulated);

    let listed = service.list_integrations().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, integration.id);

    // Second use of the same state
    let err = service.handle_callback("jira", "abc", &state).await.unwrap_err();
    assert!(matches!(err, ConnectError::InvalidState));
    assert_eq!(service.list_integrations().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_token_exchange_error_persists_nothing() {
    let server = MockServer::start().await;
    let service = service_for(jira_config(&server, false), Stores::in_memory()).await;
    let (_, state) = initiate_redirect(&service).await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "bad code"
            })),
        )
        .mount(&server)
        .await;

    let outcome = service
        .handle_redirect(
            "jira",
            CallbackParams {
                code: Some("bad".to_string()),
                state: Some(state.clone()),
                ..Default::default()
            },
        )
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("TokenExchangeFailed"));
    assert!(!outcome.message.unwrap().contains("invalid_grant"));
    assert!(service.list_integrations().await.unwrap().is_empty());
    assert!(
        service
            .stores()
            .pending_flows
            .get_pending_flow(&state)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_success_without_access_token() {
    let server = MockServer::start().await;
    let service = service_for(jira_config(&server, false), Stores::in_memory()).await;
    let (_, state) = initiate_redirect(&service).await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token_type": "Bearer" })))
        .mount(&server)
        .await;

    let err = service.handle_callback("jira", "abc", &state).await.unwrap_err();

    assert!(matches!(err, ConnectError::NoAccessToken(_)));
    assert!(service.list_integrations().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_identity_failure_persists_nothing() {
    let server = MockServer::start().await;
    let service = service_for(jira_config(&server, false), Stores::in_memory()).await;
    let (_, state) = initiate_redirect(&service).await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "access_token": "jira-access" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/oauth/token/accessible-resources"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&server)
        .await;

    let err = service.handle_callback("jira", "abc", &state).await.unwrap_err();

    assert!(matches!(err, ConnectError::IdentityFetchFailed { .. }));
    assert!(service.list_integrations().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_state_is_invalid() {
    let server = MockServer::start().await;
    let service = service_for(jira_config(&server, false), Stores::in_memory()).await;

    let outcome = service
        .handle_redirect(
            "jira",
            CallbackParams {
                code: Some("abc".to_string()),
                state: Some("S1".to_string()),
                ..Default::default()
            },
        )
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("InvalidState"));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_expired_flow_is_invalid() {
    let server = MockServer::start().await;
    let service = service_for(jira_config(&server, false), Stores::in_memory()).await;

    service
        .stores()
        .pending_flows
        .put_pending_flow(&PendingFlow {
            state: "OLD".to_string(),
            provider: Provider::Jira,
            code_verifier: "v".repeat(43),
            created_at: Utc::now() - Duration::minutes(11),
        })
        .await
        .unwrap();

    let err = service.handle_callback("jira", "abc", "OLD").await.unwrap_err();

    assert!(matches!(err, ConnectError::InvalidState));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_placeholder_client_id_is_simulated() {
    let server = MockServer::start().await;
    let mut config = jira_config(&server, false);
    if let Some(oauth) = config.oauth.as_mut() {
        oauth.providers.get_mut("jira").unwrap().client_id = Some("demo_jira".to_string());
    }
    let service = service_for(config, Stores::in_memory()).await;

    let instruction = service.initiate("jira").await.unwrap();

    let RedirectInstruction::Simulated { integration } = instruction else {
        panic!("expected a simulated completion");
    };
    assert_eq!(integration.status, IntegrationStatus::Ready);
    assert!(integration.simulated);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_missing_integration() {
    let server = MockServer::start().await;
    let service = service_for(jira_config(&server, true), Stores::in_memory()).await;
    service.initiate("linear").await.unwrap();

    service.remove_integration("missing").await.unwrap();
    assert_eq!(service.list_integrations().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_refresh_through_token_endpoint() {
    let server = MockServer::start().await;
    let service = service_for(jira_config(&server, false), Stores::in_memory()).await;
    let (_, state) = initiate_redirect(&service).await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "jira-access",
            "refresh_token": "jira-refresh",
            "expires_in": 60
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=jira-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "jira-access-2",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_jira_identity(&server).await;

    let integration = service.handle_callback("jira", "abc", &state).await.unwrap();

    // Expires within the refresh buffer
    let token = service.get_access_token(&integration.id).await.unwrap();
    assert_eq!(token, "jira-access-2");

    let stored = service
        .stores()
        .integrations
        .get_integration(&integration.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.authentication.access_token, "jira-access-2");
    assert_eq!(
        stored.authentication.refresh_token.as_deref(),
        Some("jira-refresh")
    );
}

#[tokio::test]
async fn test_connection_survives_restart_with_sqlite() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("connect.db");
    let db_path = db_path.to_str().unwrap();

    let backend = Arc::new(SqliteStorage::new(db_path).await.unwrap());
    let service = service_for(jira_config(&server, false), Stores::from_backend(backend)).await;
    let (_, state) = initiate_redirect(&service).await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "jira-access",
            "refresh_token": "jira-refresh",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;
    mount_jira_identity(&server).await;

    let integration = service.handle_callback("jira", "abc", &state).await.unwrap();
    drop(service);

    let reopened = Arc::new(SqliteStorage::new(db_path).await.unwrap());
    let listed = reopened.list_integrations().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, integration.id);
    assert_eq!(listed[0].authentication, integration.authentication);
    assert_eq!(listed[0].settings, integration.settings);
    assert_eq!(listed[0].status, IntegrationStatus::Ready);
    assert!(reopened.get_pending_flow(&state).await.unwrap().is_none());
}

#[tokio::test]
async fn test_huge_token_lifetime_still_connects() {
    let server = MockServer::start().await;
    let service = service_for(jira_config(&server, false), Stores::in_memory()).await;
    let (_, state) = initiate_redirect(&service).await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "jira-access",
            "expires_in": 9_000_000_000_000_000i64,
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;
    mount_jira_identity(&server).await;

    let handle = tokio::spawn({
        let service = service.clone();
        async move {
            service
                .handle_redirect(
                    "jira",
                    CallbackParams {
                        code: Some("abc".to_string()),
                        state: Some(state),
                        ..Default::default()
                    },
                )
                .await
        }
    });
    let outcome = handle.await.unwrap();

    assert!(outcome.success);
    let integration = outcome.integration.unwrap();
    assert_eq!(integration.authentication.access_token, "jira-access");
    assert!(integration.authentication.expires_at.is_none());
    assert_eq!(service.list_integrations().await.unwrap().len(), 1);
}
