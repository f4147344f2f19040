use thiserror::Error;

use crate::merge::MergeError;
use crate::sinks::SinkError;
use crate::store::StoreError;

/// Terminal failure of one pipeline invocation. The host treats `Err` as its
/// negative acknowledgment; faults never cross the boundary any other way.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("lineage store query failed: {0}")]
    Store(#[from] StoreError),
    #[error("failed to merge event into lineage document: {0}")]
    Merge(#[from] MergeError),
    #[error("failed to emit updated document: {0}")]
    Sink(#[from] SinkError),
}

impl PipelineError {
    /// Stable label for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Store(_) => "store",
            PipelineError::Merge(_) => "merge",
            PipelineError::Sink(_) => "sink",
        }
    }
}
