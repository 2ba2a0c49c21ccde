//! Durable storage for per-resource extraction state
//!
//! The processor never touches a store directly; the extraction driver loads
//! the [`ResourceState`] before a run and saves it after every handled batch.

use crate::checkpoint::ResourceState;
use async_trait::async_trait;

#[cfg(feature = "dynamodb-store")]
pub mod dynamodb;
#[cfg(feature = "memory-store")]
pub mod memory;

/// Trait for state storage implementations
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Retrieve the state saved for `resource`, if any
    async fn load_state(&self, resource: &str) -> anyhow::Result<Option<ResourceState>>;

    /// Replace the state saved for `resource`
    async fn save_state(&self, resource: &str, state: &ResourceState) -> anyhow::Result<()>;
}

#[cfg(feature = "dynamodb-store")]
pub use dynamodb::DynamoDbStateStore;
#[cfg(feature = "memory-store")]
pub use memory::InMemoryStateStore;
