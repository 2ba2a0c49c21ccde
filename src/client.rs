//! Wire client seam for the three Kinesis data-plane calls
//!
//! The extractor only talks to Kinesis through [`KinesisClientTrait`]. The
//! implementation for [`aws_sdk_kinesis::Client`] issues each call exactly
//! once; retry and timeout policy belong to the SDK configuration.

use crate::error::ProcessorError;
use crate::iterator::ShardIteratorRequest;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_kinesis::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_kinesis::{types::Record, Client};
use serde::Deserialize;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, trace};

/// Failures of a single Kinesis API call, classified by service error code
#[derive(Debug, Clone, Error)]
pub enum KinesisClientError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Iterator expired")]
    ExpiredIterator,

    #[error("Throughput exceeded")]
    ThroughputExceeded,

    #[error("KMS error: {0}")]
    KmsError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("{0}")]
    Other(String),
}

impl KinesisClientError {
    /// Errors that no amount of re-running will fix
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            KinesisClientError::ResourceNotFound(_)
                | KinesisClientError::InvalidArgument(_)
                | KinesisClientError::AccessDenied(_)
        )
    }

    fn from_sdk<E, R>(err: SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
        R: std::fmt::Debug,
    {
        match &err {
            SdkError::TimeoutError(_) => {
                return KinesisClientError::Timeout(DisplayErrorContext(&err).to_string())
            }
            SdkError::DispatchFailure(_) => {
                return KinesisClientError::ConnectionError(DisplayErrorContext(&err).to_string())
            }
            _ => {}
        }

        let message = err
            .message()
            .map(String::from)
            .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

        match err.code() {
            Some("ResourceNotFoundException") => KinesisClientError::ResourceNotFound(message),
            Some("InvalidArgumentException") => KinesisClientError::InvalidArgument(message),
            Some("AccessDeniedException") => KinesisClientError::AccessDenied(message),
            Some("ExpiredIteratorException") => KinesisClientError::ExpiredIterator,
            Some("ProvisionedThroughputExceededException") | Some("LimitExceededException") => {
                KinesisClientError::ThroughputExceeded
            }
            Some(code) if code.starts_with("KMS") => KinesisClientError::KmsError(message),
            _ => KinesisClientError::Other(message),
        }
    }
}

/// One page of a `ListShards` enumeration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardPage {
    pub shard_ids: Vec<String>,
    pub next_token: Option<String>,
}

/// The parts of a `GetRecords` response the poll loop acts on
#[derive(Debug, Clone, Default)]
pub struct RecordsPage {
    pub records: Vec<Record>,
    /// Absent once the shard is closed and fully read
    pub next_iterator: Option<String>,
    /// Time behind the tip of the stream
    pub millis_behind_latest: Option<i64>,
    /// Only populated once the shard has closed through resharding
    pub child_shard_ids: Vec<String>,
}

#[async_trait]
pub trait KinesisClientTrait: Send + Sync {
    /// Fetch one page of shards; `next_token` continues a previous listing
    async fn list_shards(
        &self,
        stream_name: &str,
        next_token: Option<&str>,
    ) -> Result<ShardPage, KinesisClientError>;

    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
        request: &ShardIteratorRequest,
    ) -> Result<String, KinesisClientError>;

    async fn get_records(&self, iterator: &str, limit: i32)
        -> Result<RecordsPage, KinesisClientError>;
}

#[async_trait]
impl KinesisClientTrait for Client {
    async fn list_shards(
        &self,
        stream_name: &str,
        next_token: Option<&str>,
    ) -> Result<ShardPage, KinesisClientError> {
        // ListShards rejects a stream name alongside a continuation token
        let req = match next_token {
            Some(token) => self.list_shards().next_token(token),
            None => self.list_shards().stream_name(stream_name),
        };

        let response = req.send().await.map_err(KinesisClientError::from_sdk)?;
        let page = ShardPage {
            shard_ids: response
                .shards()
                .iter()
                .map(|shard| shard.shard_id().to_string())
                .collect(),
            next_token: response.next_token().map(String::from),
        };

        trace!(
            stream = %stream_name,
            shards = page.shard_ids.len(),
            has_more = page.next_token.is_some(),
            "Listed shard page"
        );
        Ok(page)
    }

    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
        request: &ShardIteratorRequest,
    ) -> Result<String, KinesisClientError> {
        let mut req = self
            .get_shard_iterator()
            .stream_name(stream_name)
            .shard_id(shard_id)
            .shard_iterator_type(request.iterator_type());

        if let Some(seq) = request.starting_sequence_number() {
            req = req.starting_sequence_number(seq);
        }

        if let Some(ts) = request.timestamp() {
            let system_time: SystemTime = ts.into();
            req = req.timestamp(aws_smithy_types::DateTime::from(system_time));
        }

        let response = req.send().await.map_err(KinesisClientError::from_sdk)?;
        response
            .shard_iterator
            .ok_or_else(|| KinesisClientError::Other("GetShardIterator returned no iterator".to_string()))
    }

    async fn get_records(
        &self,
        iterator: &str,
        limit: i32,
    ) -> Result<RecordsPage, KinesisClientError> {
        let response = self
            .get_records()
            .shard_iterator(iterator)
            .limit(limit)
            .send()
            .await
            .map_err(KinesisClientError::from_sdk)?;

        Ok(RecordsPage {
            records: response.records().to_vec(),
            next_iterator: response.next_shard_iterator().map(String::from),
            millis_behind_latest: response.millis_behind_latest(),
            child_shard_ids: response
                .child_shards()
                .iter()
                .map(|child| child.shard_id().to_string())
                .collect(),
        })
    }
}

/// Static AWS credentials and endpoint overrides
///
/// Every field is optional: unset values fall through to the default AWS
/// provider chain and region resolution.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct AwsCredentials {
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_session_token: Option<String>,
    pub profile_name: Option<String>,
    pub region_name: Option<String>,
    pub endpoint_url: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("aws_access_key_id", &self.aws_access_key_id)
            .field(
                "aws_secret_access_key",
                &self.aws_secret_access_key.as_ref().map(|_| "***"),
            )
            .field("aws_session_token", &self.aws_session_token.as_ref().map(|_| "***"))
            .field("profile_name", &self.profile_name)
            .field("region_name", &self.region_name)
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

impl AwsCredentials {
    pub fn validate(&self) -> Result<(), ProcessorError> {
        let key = self.aws_access_key_id.as_deref();
        let secret = self.aws_secret_access_key.as_deref();

        match (key, secret) {
            (Some(k), Some(s)) if k.trim().is_empty() || s.trim().is_empty() => {
                return Err(ProcessorError::ConfigError(
                    "AWS access key id and secret must not be empty".to_string(),
                ))
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(ProcessorError::ConfigError(
                    "AWS access key id and secret must be given together".to_string(),
                ))
            }
            (None, None) if self.aws_session_token.is_some() => {
                return Err(ProcessorError::ConfigError(
                    "AWS session token given without access key".to_string(),
                ))
            }
            _ => {}
        }

        if matches!(self.region_name.as_deref(), Some(r) if r.trim().is_empty()) {
            return Err(ProcessorError::ConfigError("AWS region must not be empty".to_string()));
        }

        Ok(())
    }

    /// Build a Kinesis client from these credentials
    pub async fn build_client(&self) -> Result<Client, ProcessorError> {
        self.validate()?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(profile) = &self.profile_name {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = &self.region_name {
            loader = loader.region(Region::new(region.clone()));
        }
        if let (Some(key), Some(secret)) = (&self.aws_access_key_id, &self.aws_secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                key.clone(),
                secret.clone(),
                self.aws_session_token.clone(),
                None,
                "kinesis-extract",
            ));
        }
        if let Some(endpoint) = &self.endpoint_url {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let sdk_config = loader.load().await;
        debug!(
            region = ?sdk_config.region(),
            static_credentials = self.aws_access_key_id.is_some(),
            "Built Kinesis client"
        );
        Ok(Client::new(&sdk_config))
    }
}
