//! Storage backends for PM33 Connect
//!
//! Two stores sit behind traits so call sites never see the backend:
//! - [`PendingFlowStore`]: short-lived OAuth flows keyed by state token
//! - [`IntegrationStore`]: durable integration records, sole writer of credentials
//!
//! Both are implemented by [`MemoryStorage`] and [`SqliteStorage`].

pub mod memory;
pub mod sqlite;

use crate::model::{Authentication, Integration, IntegrationStatus, PendingFlow};
use crate::{ConnectError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// Key-value store for in-flight authorization attempts
#[async_trait]
pub trait PendingFlowStore: Send + Sync {
    /// Persist a new pending flow
    async fn put_pending_flow(&self, flow: &PendingFlow) -> Result<()>;

    /// Read a pending flow without consuming it
    async fn get_pending_flow(&self, state: &str) -> Result<Option<PendingFlow>>;

    /// Atomically fetch and delete a pending flow.
    /// At most one caller gets `Some` for a given state.
    async fn take_pending_flow(&self, state: &str) -> Result<Option<PendingFlow>>;

    /// Delete a pending flow (no-op if missing)
    async fn delete_pending_flow(&self, state: &str) -> Result<()>;

    /// Delete every flow created at or before `cutoff`, returning how many were removed
    async fn expire_pending_flows(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// Durable store of integration records
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    /// Insert or replace an integration by id; a replaced record keeps its list position
    async fn save_integration(&self, integration: &Integration) -> Result<()>;

    /// All integrations in insertion order
    async fn list_integrations(&self) -> Result<Vec<Integration>>;

    /// Get an integration by id
    async fn get_integration(&self, id: &str) -> Result<Option<Integration>>;

    /// Remove an integration (no-op if missing)
    async fn remove_integration(&self, id: &str) -> Result<()>;

    /// Replace the whole authentication block of an integration.
    /// Returns false if the integration does not exist.
    async fn update_integration_credentials(
        &self,
        id: &str,
        authentication: &Authentication,
    ) -> Result<bool>;

    /// Change the lifecycle status of an integration.
    /// Returns false if the integration does not exist.
    async fn set_integration_status(&self, id: &str, status: IntegrationStatus) -> Result<bool>;
}

/// Handles to both stores, usually backed by the same backend
#[derive(Clone)]
pub struct Stores {
    pub pending_flows: Arc<dyn PendingFlowStore>,
    pub integrations: Arc<dyn IntegrationStore>,
}

impl Stores {
    /// Use one backend for both stores
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: PendingFlowStore + IntegrationStore + 'static,
    {
        Self {
            pending_flows: backend.clone(),
            integrations: backend,
        }
    }

    /// Fresh in-memory stores
    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(MemoryStorage::new()))
    }
}

/// Create the stores from configuration
pub async fn create_storage_from_config(config: &crate::config::StorageConfig) -> Result<Stores> {
    match config.driver.as_str() {
        crate::constants::STORAGE_DRIVER_MEMORY => Ok(Stores::in_memory()),
        crate::constants::STORAGE_DRIVER_SQLITE => Ok(Stores::from_backend(Arc::new(
            SqliteStorage::new(&config.dsn).await?,
        ))),
        _ => Err(ConnectError::config(format!(
            "Unknown storage driver: {}. Supported: memory, sqlite",
            config.driver
        ))),
    }
}

/// Periodically delete pending flows older than `ttl`.
///
/// Abandoned flows are already rejected by the callback handler once expired;
/// this only reclaims their storage.
pub fn spawn_pending_flow_sweeper(
    store: Arc<dyn PendingFlowStore>,
    ttl: chrono::Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let cutoff = Utc::now() - ttl;
            match store.expire_pending_flows(cutoff).await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Expired abandoned OAuth flows"),
                Err(e) => tracing::error!(error = %e, "Failed to expire pending OAuth flows"),
            }
        }
    })
}
