use crate::checkpoint::ResourceState;
use crate::store::StateStore;
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{types::AttributeValue, Client as DynamoClient};
use tracing::{debug, instrument, trace};

/// DynamoDB-backed state storage
///
/// One item per resource: the partition key `resource` holds the prefixed
/// resource name and the `state` attribute holds the JSON snapshot.
#[derive(Debug, Clone)]
pub struct DynamoDbStateStore {
    client: DynamoClient,
    table_name: String,
    key_prefix: String,
}

impl DynamoDbStateStore {
    pub fn builder() -> DynamoDbStateStoreBuilder {
        DynamoDbStateStoreBuilder::new()
    }

    pub fn new(client: DynamoClient, table_name: String, key_prefix: String) -> Self {
        Self {
            client,
            table_name,
            key_prefix,
        }
    }

    fn prefixed_key(&self, resource: &str) -> String {
        format!("{}{}", self.key_prefix, resource)
    }
}

#[async_trait]
impl StateStore for DynamoDbStateStore {
    #[instrument(skip(self), fields(table = %self.table_name, prefix = %self.key_prefix))]
    async fn load_state(&self, resource: &str) -> anyhow::Result<Option<ResourceState>> {
        let key = self.prefixed_key(resource);
        trace!(key = %key, "Getting state from DynamoDB");

        let response = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("resource", AttributeValue::S(key.clone()))
            .consistent_read(true)
            .send()
            .await
            .context("Failed to get state from DynamoDB")?;

        let raw = response
            .item
            .and_then(|item| item.get("state").cloned())
            .and_then(|attr| attr.as_s().ok().cloned());

        let state = match raw {
            Some(json) => Some(
                serde_json::from_str(&json)
                    .with_context(|| format!("Invalid state stored under {}", key))?,
            ),
            None => None,
        };

        debug!(key = %key, found = state.is_some(), "Retrieved state from DynamoDB");
        Ok(state)
    }

    #[instrument(skip(self, state), fields(table = %self.table_name, prefix = %self.key_prefix))]
    async fn save_state(&self, resource: &str, state: &ResourceState) -> anyhow::Result<()> {
        let key = self.prefixed_key(resource);
        let json = serde_json::to_string(state).context("Failed to serialize state")?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("resource", AttributeValue::S(key.clone()))
            .item("state", AttributeValue::S(json))
            .send()
            .await
            .context("Failed to save state to DynamoDB")?;

        debug!(key = %key, shards = state.kinesis.len(), "Saved state to DynamoDB");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct DynamoDbStateStoreBuilder {
    client: Option<DynamoClient>,
    table_name: Option<String>,
    key_prefix: Option<String>,
}

impl DynamoDbStateStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, client: DynamoClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_table_name(mut self, table_name: String) -> Self {
        self.table_name = Some(table_name);
        self
    }

    pub fn with_key_prefix(mut self, key_prefix: String) -> Self {
        self.key_prefix = Some(key_prefix);
        self
    }

    pub fn build(self) -> anyhow::Result<DynamoDbStateStore> {
        Ok(DynamoDbStateStore {
            client: self.client.ok_or_else(|| anyhow::anyhow!("DynamoDB client is required"))?,
            table_name: self.table_name.ok_or_else(|| anyhow::anyhow!("Table name is required"))?,
            key_prefix: self.key_prefix.unwrap_or_default(),
        })
    }
}
