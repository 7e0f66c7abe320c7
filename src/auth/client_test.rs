use super::*;
use crate::auth::test_support::{
    StubAdapter, TokenReply, directory_with, identity, provider_config, tokens,
};
use crate::model::{Provider, TokenSet};
use crate::storage::MemoryStorage;
use chrono::Duration;
use std::sync::atomic::Ordering;

async fn saved_integration(storage: &MemoryStorage, expires_in: Duration) -> Integration {
    let mut integration = Integration::connected(
        Provider::Jira,
        "Jira",
        tokens("access-1"),
        identity(),
        false,
        Utc::now(),
    )
    .unwrap();
    integration.authentication.expires_at = Some(Utc::now() + expires_in);
    storage.save_integration(&integration).await.unwrap();
    integration
}

async fn manager(
    adapter: StubAdapter,
) -> (OAuthClientManager, Arc<MemoryStorage>, Arc<StubAdapter>) {
    let adapter = Arc::new(adapter);
    let storage = Arc::new(MemoryStorage::new());
    let manager = OAuthClientManager::new(directory_with(adapter.clone()), storage.clone());
    (manager, storage, adapter)
}

#[tokio::test]
async fn test_fresh_token_is_returned_without_refresh() {
    let (manager, storage, adapter) =
        manager(StubAdapter::new(provider_config(Provider::Jira).await)).await;
    let integration = saved_integration(&storage, Duration::hours(1)).await;

    let token = manager.get_access_token(&integration.id).await.unwrap();

    assert_eq!(token, "access-1");
    assert_eq!(adapter.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_expiring_token_is_refreshed_and_stored() {
    let (manager, storage, adapter) =
        manager(StubAdapter::new(provider_config(Provider::Jira).await)).await;
    let integration = saved_integration(&storage, Duration::seconds(60)).await;

    let token = manager.get_access_token(&integration.id).await.unwrap();

    assert_eq!(token, "access-2");
    assert_eq!(adapter.refresh_calls.load(Ordering::SeqCst), 1);

    let stored = storage.get_integration(&integration.id).await.unwrap().unwrap();
    assert_eq!(stored.authentication.access_token, "access-2");
    assert!(stored.authentication.expires_at.unwrap() > Utc::now() + Duration::minutes(30));
    assert_eq!(stored.status, IntegrationStatus::Ready);
    assert_eq!(stored.settings, integration.settings);
}

#[tokio::test]
async fn test_refresh_keeps_refresh_token_when_not_rotated() {
    let adapter = StubAdapter::new(provider_config(Provider::Jira).await).with_refresh(
        TokenReply::Tokens(TokenSet {
            access_token: Some("access-2".to_string()),
            refresh_token: None,
            expires_in: Some(3600),
            scope: None,
        }),
    );
    let (manager, storage, _adapter) = manager(adapter).await;
    let integration = saved_integration(&storage, Duration::seconds(-10)).await;

    manager.get_access_token(&integration.id).await.unwrap();

    let stored = storage.get_integration(&integration.id).await.unwrap().unwrap();
    assert_eq!(stored.authentication.refresh_token.as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn test_simulated_integration_is_never_refreshed() {
    let (manager, storage, adapter) =
        manager(StubAdapter::new(provider_config(Provider::Jira).await)).await;
    let mut integration = saved_integration(&storage, Duration::seconds(-10)).await;
    integration.simulated = true;
    storage.save_integration(&integration).await.unwrap();

    let token = manager.get_access_token(&integration.id).await.unwrap();

    assert_eq!(token, "access-1");
    assert_eq!(adapter.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_refresh_failure_marks_integration_error() {
    let adapter = StubAdapter::new(provider_config(Provider::Jira).await)
        .with_refresh(TokenReply::HttpError(400, "invalid_grant".to_string()));
    let (manager, storage, _adapter) = manager(adapter).await;
    let integration = saved_integration(&storage, Duration::seconds(30)).await;

    let err = manager.get_access_token(&integration.id).await.unwrap_err();

    assert!(matches!(
        err,
        ConnectError::TokenExchangeFailed {
            status: Some(400),
            ..
        }
    ));
    let stored = storage.get_integration(&integration.id).await.unwrap().unwrap();
    assert_eq!(stored.status, IntegrationStatus::Error);
    assert_eq!(stored.authentication.access_token, "access-1");
}

#[tokio::test]
async fn test_refresh_without_access_token_is_an_exchange_failure() {
    let adapter = StubAdapter::new(provider_config(Provider::Jira).await)
        .with_refresh(TokenReply::MissingAccessToken);
    let (manager, storage, _adapter) = manager(adapter).await;
    let integration = saved_integration(&storage, Duration::seconds(30)).await;

    let err = manager.get_access_token(&integration.id).await.unwrap_err();
    assert!(matches!(err, ConnectError::TokenExchangeFailed { .. }));
}

#[tokio::test]
async fn test_successful_refresh_recovers_error_status() {
    let (manager, storage, _adapter) =
        manager(StubAdapter::new(provider_config(Provider::Jira).await)).await;
    let integration = saved_integration(&storage, Duration::seconds(30)).await;
    storage
        .set_integration_status(&integration.id, IntegrationStatus::Error)
        .await
        .unwrap();

    manager.get_access_token(&integration.id).await.unwrap();

    let stored = storage.get_integration(&integration.id).await.unwrap().unwrap();
    assert_eq!(stored.status, IntegrationStatus::Ready);
}

#[tokio::test]
async fn test_missing_refresh_token_returns_stored_token() {
    let (manager, storage, adapter) =
        manager(StubAdapter::new(provider_config(Provider::Jira).await)).await;
    let mut integration = saved_integration(&storage, Duration::seconds(30)).await;
    integration.authentication.refresh_token = None;
    storage.save_integration(&integration).await.unwrap();

    let token = manager.get_access_token(&integration.id).await.unwrap();

    assert_eq!(token, "access-1");
    assert_eq!(adapter.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_integration() {
    let (manager, _storage, _adapter) =
        manager(StubAdapter::new(provider_config(Provider::Jira).await)).await;

    let err = manager.get_access_token("missing").await.unwrap_err();
    assert!(matches!(err, ConnectError::Validation(_)));
}
