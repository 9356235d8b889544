// src/matching/source.rs - The reference-store seam the engine matches against
use anyhow::Result;
use async_trait::async_trait;

use crate::models::core::ReferenceRecord;

/// A read-only source of CRM reference records, queried one partition
/// (canonical state code) at a time. Fetching is the only operation in the
/// engine that blocks on an external resource; a failure here is isolated to
/// its partition by the caller. Retry/backoff around the underlying
/// connection belongs to implementations, not to the engine.
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn fetch(&self, partition_key: &str) -> Result<Vec<ReferenceRecord>>;
}

/// In-memory source for tests and offline runs: partition key to records.
#[derive(Debug, Default)]
pub struct InMemorySource {
    partitions: std::collections::HashMap<String, Vec<ReferenceRecord>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partition(mut self, key: &str, records: Vec<ReferenceRecord>) -> Self {
        self.partitions.insert(key.to_string(), records);
        self
    }
}

#[async_trait]
impl ReferenceSource for InMemorySource {
    async fn fetch(&self, partition_key: &str) -> Result<Vec<ReferenceRecord>> {
        Ok(self
            .partitions
            .get(partition_key)
            .cloned()
            .unwrap_or_default())
    }
}
