use super::*;
use crate::auth::pkce::{derive_challenge, is_url_safe};
use crate::auth::test_support::{StubAdapter, directory_with, provider_config};
use crate::model::{IntegrationStatus, Provider};
use crate::storage::MemoryStorage;

async fn setup(adapter: StubAdapter) -> (AuthorizationInitiator, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let initiator = AuthorizationInitiator::new(
        directory_with(Arc::new(adapter)),
        storage.clone(),
        storage.clone(),
    )
    .with_simulated_delay(Duration::from_millis(0));
    (initiator, storage)
}

fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

#[tokio::test]
async fn test_initiate_persists_flow_matching_url_state() {
    let adapter = StubAdapter::new(provider_config(Provider::Jira).await);
    let (initiator, storage) = setup(adapter).await;

    let instruction = initiator.initiate("jira").await.unwrap();
    let RedirectInstruction::Redirect { url, state } = instruction else {
        panic!("expected a redirect");
    };

    assert_eq!(query_param(&url, "state").as_deref(), Some(state.as_str()));
    assert_eq!(
        query_param(&url, "code_challenge_method").as_deref(),
        Some("S256")
    );
    assert!(is_url_safe(&state));

    let flow = storage.get_pending_flow(&state).await.unwrap().unwrap();
    assert_eq!(flow.provider, Provider::Jira);
    assert_eq!(
        query_param(&url, "code_challenge").unwrap(),
        derive_challenge(&flow.code_verifier)
    );
    assert_ne!(flow.code_verifier, state);
    assert!(Utc::now() - flow.created_at < chrono::Duration::seconds(5));
}

#[tokio::test]
async fn test_each_initiation_gets_a_fresh_state() {
    let adapter = StubAdapter::new(provider_config(Provider::Jira).await);
    let (initiator, _storage) = setup(adapter).await;

    let first = initiator.initiate("jira").await.unwrap();
    let second = initiator.initiate("jira").await.unwrap();
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_unknown_provider_creates_no_state() {
    let adapter = StubAdapter::new(provider_config(Provider::Jira).await);
    let (initiator, storage) = setup(adapter).await;

    let err = initiator.initiate("trello").await.unwrap_err();
    assert!(matches!(err, crate::ConnectError::UnknownProvider(_)));

    // Registered provider without an adapter in this directory
    let err = initiator.initiate("asana").await.unwrap_err();
    assert!(matches!(err, crate::ConnectError::UnknownProvider(_)));

    assert_eq!(storage.expire_pending_flows(Utc::now()).await.unwrap(), 0);
    assert!(storage.list_integrations().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_simulated_provider_completes_without_redirect() {
    let adapter = Arc::new(
        crate::providers::SimulatedAdapter::new(provider_config(Provider::Linear).await),
    );
    let storage = Arc::new(MemoryStorage::new());
    let initiator = AuthorizationInitiator::new(
        Arc::new(ProviderDirectory::from_adapters([
            adapter as Arc<dyn ProviderAdapter>
        ])),
        storage.clone(),
        storage.clone(),
    )
    .with_simulated_delay(Duration::from_millis(10));

    let instruction = initiator.initiate("linear").await.unwrap();
    let RedirectInstruction::Simulated { integration } = instruction else {
        panic!("expected a simulated completion");
    };

    assert_eq!(integration.status, IntegrationStatus::Ready);
    assert!(integration.simulated);
    assert!(integration.authentication.validated);
    assert!(!integration.authentication.access_token.is_empty());
    assert!(integration.authentication.access_token.starts_with("demo_"));
    assert_eq!(integration.display_name, "Linear – Demo Workspace");

    // Persisted, and no pending flow left behind
    let stored = storage.list_integrations().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, integration.id);
    assert_eq!(storage.expire_pending_flows(Utc::now()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_simulated_delay_is_applied() {
    let adapter = Arc::new(StubAdapter::new(provider_config(Provider::Monday).await).simulated());
    let storage = Arc::new(MemoryStorage::new());
    let initiator =
        AuthorizationInitiator::new(directory_with(adapter), storage.clone(), storage.clone())
            .with_simulated_delay(Duration::from_millis(50));

    let started = std::time::Instant::now();
    let instruction = initiator.initiate("monday").await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(matches!(instruction, RedirectInstruction::Simulated { .. }));
}

#[test]
fn test_redirect_instruction_json_shape() {
    let instruction = RedirectInstruction::Redirect {
        url: "https://auth.example/authorize".to_string(),
        state: "S1".to_string(),
    };
    let json = serde_json::to_value(&instruction).unwrap();
    assert_eq!(json["type"], "redirect");
    assert_eq!(json["state"], "S1");
}
