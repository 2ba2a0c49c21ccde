use crate::checkpoint::ResourceState;
use crate::error::Result;
use crate::processor::{Batch, KinesisProcessor, ProcessorConfig};
use crate::test::mocks::MockKinesisClient;
use std::sync::Once;

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "kinesis_extract=debug".into()),
            )
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .try_init()
            .ok();
    });
}

pub fn create_test_config(stream_name: &str) -> ProcessorConfig {
    ProcessorConfig {
        stream_name: stream_name.to_string(),
        ..Default::default()
    }
}

/// Pull every batch of one run
pub async fn drain(processor: &mut KinesisProcessor<MockKinesisClient>) -> Result<Vec<Batch>> {
    let mut batches = Vec::new();
    while let Some(batch) = processor.next_batch().await? {
        batches.push(batch);
    }
    Ok(batches)
}

pub fn new_processor(
    config: ProcessorConfig,
    client: &MockKinesisClient,
    state: ResourceState,
) -> Result<KinesisProcessor<MockKinesisClient>> {
    let (processor, _) = KinesisProcessor::new(config, client.clone(), state)?;
    Ok(processor)
}
