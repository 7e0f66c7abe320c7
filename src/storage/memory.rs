//! In-memory storage implementation
//!
//! Non-persistent storage for development, demos and tests.
//! Pending flows live in a DashMap so a take is a single `remove`; integrations
//! live in an ordered Vec so listing keeps insertion order.
//!
//! **WARNING:** data is lost on restart and is not shared between processes.
//! Use SqliteStorage for anything that must survive a restart.

use super::*;
use dashmap::DashMap;
use parking_lot::RwLock;

/// In-memory storage implementation
#[derive(Clone, Default)]
pub struct MemoryStorage {
    pending_flows: Arc<DashMap<String, PendingFlow>>,
    integrations: Arc<RwLock<Vec<Integration>>>,
}

impl MemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingFlowStore for MemoryStorage {
    async fn put_pending_flow(&self, flow: &PendingFlow) -> Result<()> {
        self.pending_flows.insert(flow.state.clone(), flow.clone());
        Ok(())
    }

    async fn get_pending_flow(&self, state: &str) -> Result<Option<PendingFlow>> {
        Ok(self.pending_flows.get(state).map(|f| f.value().clone()))
    }

    async fn take_pending_flow(&self, state: &str) -> Result<Option<PendingFlow>> {
        // DashMap::remove is atomic per key
        Ok(self.pending_flows.remove(state).map(|(_, flow)| flow))
    }

    async fn delete_pending_flow(&self, state: &str) -> Result<()> {
        self.pending_flows.remove(state);
        Ok(())
    }

    async fn expire_pending_flows(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        self.pending_flows.retain(|_, flow| {
            let keep = flow.created_at > cutoff;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}

#[async_trait]
impl IntegrationStore for MemoryStorage {
    async fn save_integration(&self, integration: &Integration) -> Result<()> {
        let mut integrations = self.integrations.write();
        match integrations.iter_mut().find(|i| i.id == integration.id) {
            Some(existing) => *existing = integration.clone(),
            None => integrations.push(integration.clone()),
        }
        Ok(())
    }

    async fn list_integrations(&self) -> Result<Vec<Integration>> {
        Ok(self.integrations.read().clone())
    }

    async fn get_integration(&self, id: &str) -> Result<Option<Integration>> {
        Ok(self.integrations.read().iter().find(|i| i.id == id).cloned())
    }

    async fn remove_integration(&self, id: &str) -> Result<()> {
        self.integrations.write().retain(|i| i.id != id);
        Ok(())
    }

    async fn update_integration_credentials(
        &self,
        id: &str,
        authentication: &Authentication,
    ) -> Result<bool> {
        let mut integrations = self.integrations.write();
        match integrations.iter_mut().find(|i| i.id == id) {
            Some(integration) => {
                integration.authentication = authentication.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_integration_status(&self, id: &str, status: IntegrationStatus) -> Result<bool> {
        let mut integrations = self.integrations.write();
        match integrations.iter_mut().find(|i| i.id == id) {
            Some(integration) => {
                integration.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
