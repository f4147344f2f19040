use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lineage::LineageDocument;

pub mod kafka;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("emission could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("emission exceeds the maximum message size")]
    TooLarge,
    #[error("transient sink failure, emission may be retried")]
    Retryable,
}

/// A finished document plus the routing metadata downstream delivery needs.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Emission {
    pub index: String,
    pub id: String,
    pub document: LineageDocument,
}

impl Emission {
    /// Partition key, so updates to one document stay ordered.
    pub fn key(&self) -> String {
        format!("{}:{}", self.index, self.id)
    }
}

/// Downstream delivery of enriched documents. Fire-and-forget from the
/// pipeline's perspective; an error fails the invocation in flight.
#[async_trait]
pub trait EmissionSink {
    async fn emit(&self, emission: Emission) -> Result<(), SinkError>;
}

/// Logs emissions instead of delivering them. For dev loops and tests.
pub struct PrintSink {}

#[async_trait]
impl EmissionSink for PrintSink {
    async fn emit(&self, emission: Emission) -> Result<(), SinkError> {
        tracing::info!(
            index = %emission.index,
            id = %emission.id,
            "emission: {:?}",
            emission.document
        );
        counter!("leadtime_emissions_ingested_total").increment(1);

        Ok(())
    }
}
