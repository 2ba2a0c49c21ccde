use crate::checkpoint::ResourceState;
use crate::store::StateStore;
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::{debug, instrument, trace};

/// In-memory implementation of state storage
#[derive(Debug, Default, Clone)]
pub struct InMemoryStateStore {
    states: Arc<RwLock<HashMap<String, ResourceState>>>,
    history: Arc<RwLock<Vec<(String, ResourceState)>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        debug!("Initializing in-memory state store");
        Self::default()
    }

    /// Store seeded with `state` for `resource`
    pub fn with_state(resource: &str, state: ResourceState) -> Self {
        Self {
            states: Arc::new(RwLock::new(HashMap::from([(resource.to_string(), state)]))),
            history: Arc::default(),
        }
    }

    /// Every save in call order
    pub async fn history(&self) -> Vec<(String, ResourceState)> {
        self.history.read().await.clone()
    }

    pub async fn save_count(&self) -> usize {
        self.history.read().await.len()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    #[instrument(skip(self))]
    async fn load_state(&self, resource: &str) -> anyhow::Result<Option<ResourceState>> {
        let state = self.states.read().await.get(resource).cloned();
        debug!(
            resource = %resource,
            shards = state.as_ref().map(|s| s.kinesis.len()),
            "Loaded state from memory"
        );
        Ok(state)
    }

    #[instrument(skip(self, state))]
    async fn save_state(&self, resource: &str, state: &ResourceState) -> anyhow::Result<()> {
        trace!(resource = %resource, state = ?state, "Saving state to memory");

        self.states
            .write()
            .await
            .insert(resource.to_string(), state.clone());
        self.history
            .write()
            .await
            .push((resource.to_string(), state.clone()));
        Ok(())
    }
}
