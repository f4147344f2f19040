use std::sync::Arc;

use metrics::counter;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::PipelineError;
use crate::event::{BuildEvent, CiEvent, ClassifiedEvent, DeployEvent};
use crate::lineage::StoredDocument;
use crate::merge::{merge_build, merge_deploy};
use crate::sinks::kafka::KafkaSink;
use crate::sinks::{Emission, EmissionSink, PrintSink, SinkError};
use crate::store::{HttpLineageStore, LineageStore};

/// Index the enriched documents are routed to downstream.
pub const LEAD_TIME_INDEX: &str = "lead_time";

/// What a successful invocation did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessOutcome {
    /// Unrecognized event, or one without the identity needed to correlate.
    Skipped,
    /// The event was correlated; every matched document was merged.
    Processed { matched: usize, emitted: usize },
}

/// Correlates one decoded CI event at a time against the lineage store and
/// hands qualifying updates to the emission sink.
///
/// Holds no state between invocations, so a host may drive it concurrently
/// for independent events. Two racing events that match the same lineage
/// document are NOT coordinated here: both read the pre-update document and
/// the later emission overwrites the earlier appended record. The store is
/// the only serialization point.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn LineageStore + Send + Sync>,
    sink: Arc<dyn EmissionSink + Send + Sync>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn LineageStore + Send + Sync>,
        sink: Arc<dyn EmissionSink + Send + Sync>,
    ) -> Pipeline {
        Pipeline { store, sink }
    }

    /// Wire the concrete collaborators from environment configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Pipeline> {
        let store = HttpLineageStore::new(
            &config.store_url,
            &config.store_index,
            config.store_timeout.0,
        )?;

        let sink: Arc<dyn EmissionSink + Send + Sync> = if config.print_sink {
            Arc::new(PrintSink {})
        } else {
            Arc::new(KafkaSink::new(&config.kafka)?)
        };

        Ok(Pipeline::new(Arc::new(store), sink))
    }

    /// Process one inbound event to completion.
    ///
    /// Every fault is contained here: the host only ever sees the returned
    /// result (`is_ok()` is its acknowledgment signal), never a collaborator
    /// error in flight. Emissions already handed to the sink before a
    /// mid-fan-out failure stand; nothing is rolled back.
    pub async fn process(&self, event: &CiEvent) -> Result<ProcessOutcome, PipelineError> {
        counter!("leadtime_events_received_total").increment(1);

        let result = self.run(event).await;

        match &result {
            Ok(outcome) => debug!(outcome = ?outcome, "event processed"),
            Err(err) => {
                counter!("leadtime_events_failed_total", "kind" => err.kind()).increment(1);
                error!(kind = err.kind(), "failed to process event: {}", err);
            }
        }

        result
    }

    async fn run(&self, event: &CiEvent) -> Result<ProcessOutcome, PipelineError> {
        match event.classify() {
            ClassifiedEvent::Deploy(deploy) => self.process_deploy(deploy).await,
            ClassifiedEvent::Build(build) => self.process_build(build).await,
            ClassifiedEvent::Unclassified => {
                counter!("leadtime_events_unclassified_total").increment(1);
                debug!("ignoring unclassified event");
                Ok(ProcessOutcome::Skipped)
            }
        }
    }

    async fn process_deploy(&self, deploy: DeployEvent) -> Result<ProcessOutcome, PipelineError> {
        let Some(artifact) = &deploy.artifact else {
            debug!("deploy event carries no artifact identity, nothing to correlate");
            return Ok(ProcessOutcome::Skipped);
        };

        let matches = self.store.find_by_artifact(artifact).await?;
        let matched = matches.len();
        let mut emitted = 0;

        for mut stored in matches {
            let emit = merge_deploy(&mut stored.document, &deploy)?;
            counter!("leadtime_documents_merged_total").increment(1);

            if emit {
                self.emit(stored).await?;
                emitted += 1;
            }
        }

        Ok(ProcessOutcome::Processed { matched, emitted })
    }

    async fn process_build(&self, build: BuildEvent) -> Result<ProcessOutcome, PipelineError> {
        let Some(commit) = &build.commit else {
            debug!("build event carries no commit id, nothing to correlate");
            return Ok(ProcessOutcome::Skipped);
        };

        let matches = self.store.find_by_commit(commit).await?;
        let matched = matches.len();
        let mut emitted = 0;

        for mut stored in matches {
            let emit = merge_build(&mut stored.document, &build);
            counter!("leadtime_documents_merged_total").increment(1);

            if emit {
                self.emit(stored).await?;
                emitted += 1;
            }
        }

        Ok(ProcessOutcome::Processed { matched, emitted })
    }

    async fn emit(&self, stored: StoredDocument) -> Result<(), SinkError> {
        counter!("leadtime_documents_emitted_total").increment(1);

        self.sink
            .emit(Emission {
                index: LEAD_TIME_INDEX.to_owned(),
                id: stored.id,
                document: stored.document,
            })
            .await
    }
}
