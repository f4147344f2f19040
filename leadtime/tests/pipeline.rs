use std::sync::{Arc, Mutex};

use assert_json_diff::assert_json_eq;
use async_trait::async_trait;
use serde_json::{json, Value};

use leadtime::error::PipelineError;
use leadtime::event::CiEvent;
use leadtime::lineage::{ArtifactId, LineageDocument, StoredDocument};
use leadtime::pipeline::{Pipeline, ProcessOutcome, LEAD_TIME_INDEX};
use leadtime::sinks::{Emission, EmissionSink, SinkError};
use leadtime::store::{LineageStore, StoreError};

fn event(value: Value) -> CiEvent {
    serde_json::from_value(value).unwrap()
}

fn document(value: Value) -> LineageDocument {
    serde_json::from_value(value).unwrap()
}

/// A lineage that already recorded a successful build of svc 1.2.3, the way
/// the upstream ingester plus a prior build event would have left it.
fn built_document() -> LineageDocument {
    document(json!({
        "started_at": "2024-01-01T00:00:00Z",
        "created_at": "2024-01-01T00:10:00Z",
        "commits": [{"id": "abc123"}],
        "builds": [{
            "artifact": {"id": "svc", "group": "com.x", "name": "svc", "version": "1.2.3"},
            "result": "success",
            "built_at": "2024-01-01T00:30:00Z"
        }]
    }))
}

fn healthy_deploy() -> CiEvent {
    event(json!({
        "jobType": "deploy",
        "appName": "svc",
        "groupID": "com.x",
        "versionNumber": "1.2.3",
        "state": "healthy",
        "@timestamp": "2024-01-01T01:00:00Z"
    }))
}

#[derive(Clone, Default)]
struct MemoryStore {
    documents: Arc<Mutex<Vec<StoredDocument>>>,
}

impl MemoryStore {
    fn insert(&self, id: &str, document: LineageDocument) {
        self.documents.lock().unwrap().push(StoredDocument {
            id: id.to_owned(),
            document,
        });
    }
}

fn has_commit(document: &LineageDocument, commit: &str) -> bool {
    document
        .extra
        .get("commits")
        .and_then(Value::as_array)
        .is_some_and(|commits| {
            commits
                .iter()
                .any(|c| c.get("id").and_then(Value::as_str) == Some(commit))
        })
}

#[async_trait]
impl LineageStore for MemoryStore {
    async fn find_by_artifact(
        &self,
        artifact: &ArtifactId,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .iter()
            .filter(|stored| {
                stored
                    .document
                    .builds
                    .iter()
                    .any(|build| &build.artifact == artifact)
            })
            .cloned()
            .collect())
    }

    async fn find_by_commit(&self, commit: &str) -> Result<Vec<StoredDocument>, StoreError> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .iter()
            .filter(|stored| has_commit(&stored.document, commit))
            .cloned()
            .collect())
    }
}

struct FailingStore;

#[async_trait]
impl LineageStore for FailingStore {
    async fn find_by_artifact(
        &self,
        _artifact: &ArtifactId,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        Err(unreachable_store())
    }

    async fn find_by_commit(&self, _commit: &str) -> Result<Vec<StoredDocument>, StoreError> {
        Err(unreachable_store())
    }
}

fn unreachable_store() -> StoreError {
    StoreError::InvalidUrl("lead_time/_search".parse::<url::Url>().unwrap_err())
}

#[derive(Clone, Default)]
struct MemorySink {
    emissions: Arc<Mutex<Vec<Emission>>>,
}

impl MemorySink {
    fn len(&self) -> usize {
        self.emissions.lock().unwrap().len()
    }

    fn emissions(&self) -> Vec<Emission> {
        self.emissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmissionSink for MemorySink {
    async fn emit(&self, emission: Emission) -> Result<(), SinkError> {
        self.emissions.lock().unwrap().push(emission);
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl EmissionSink for FailingSink {
    async fn emit(&self, _emission: Emission) -> Result<(), SinkError> {
        Err(SinkError::Retryable)
    }
}

fn pipeline(store: MemoryStore, sink: MemorySink) -> Pipeline {
    Pipeline::new(Arc::new(store), Arc::new(sink))
}

#[tokio::test]
async fn build_event_enriches_the_matching_lineage() {
    let store = MemoryStore::default();
    store.insert(
        "doc-1",
        document(json!({
            "started_at": "2024-01-31T23:00:00Z",
            "created_at": "2024-01-31T23:05:00Z",
            "commits": [{"id": "abc123"}]
        })),
    );
    let sink = MemorySink::default();
    let pipeline = pipeline(store, sink.clone());

    let outcome = pipeline
        .process(&event(json!({
            "groupID": "com.x",
            "appName": "svc",
            "versionNumber": "1.2.3",
            "gitCommit": "abc123",
            "state": "success",
            "@timestamp": "2024-02-01T00:00:00Z"
        })))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ProcessOutcome::Processed {
            matched: 1,
            emitted: 1
        }
    );
    assert_eq!(sink.len(), 1);

    let emissions = sink.emissions();
    let emission = &emissions[0];
    assert_eq!(emission.index, LEAD_TIME_INDEX);
    assert_eq!(emission.id, "doc-1");
    assert_json_eq!(
        json!(emission.document),
        json!({
            "started_at": "2024-01-31T23:00:00Z",
            "created_at": "2024-01-31T23:05:00Z",
            "commits": [{"id": "abc123"}],
            "builds": [{
                "artifact": {"id": "svc", "group": "com.x", "name": "svc", "version": "1.2.3"},
                "result": "success",
                "built_at": "2024-02-01T00:00:00Z"
            }]
        })
    );
}

#[tokio::test]
async fn deploy_event_computes_lead_time_metrics() {
    let store = MemoryStore::default();
    store.insert("doc-1", built_document());
    let sink = MemorySink::default();
    let pipeline = pipeline(store, sink.clone());

    let outcome = pipeline.process(&healthy_deploy()).await.unwrap();

    assert_eq!(
        outcome,
        ProcessOutcome::Processed {
            matched: 1,
            emitted: 1
        }
    );

    let emissions = sink.emissions();
    let deploys = &emissions[0].document.deploys;
    assert_eq!(deploys.len(), 1);
    assert_eq!(deploys[0].total_time, 3600);
    assert_eq!(deploys[0].progress_time, 3000);
    assert_eq!(deploys[0].completed_at, "2024-01-01T01:00:00Z");
    assert_eq!(deploys[0].result.as_deref(), Some("healthy"));
}

#[tokio::test]
async fn one_event_updates_every_matching_document() {
    let store = MemoryStore::default();
    store.insert("doc-1", built_document());
    store.insert("doc-2", built_document());
    store.insert("doc-3", built_document());
    let sink = MemorySink::default();
    let pipeline = pipeline(store, sink.clone());

    let outcome = pipeline.process(&healthy_deploy()).await.unwrap();

    assert_eq!(
        outcome,
        ProcessOutcome::Processed {
            matched: 3,
            emitted: 3
        }
    );
    let ids: Vec<String> = sink.emissions().iter().map(|e| e.id.clone()).collect();
    assert_eq!(ids, vec!["doc-1", "doc-2", "doc-3"]);
}

#[tokio::test]
async fn unhealthy_deploy_is_not_emitted() {
    let store = MemoryStore::default();
    store.insert("doc-1", built_document());
    let sink = MemorySink::default();
    let pipeline = pipeline(store, sink.clone());

    let outcome = pipeline
        .process(&event(json!({
            "jobType": "deploy",
            "appName": "svc",
            "groupID": "com.x",
            "versionNumber": "1.2.3",
            "state": "unhealthy",
            "@timestamp": "2024-01-01T01:00:00Z"
        })))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ProcessOutcome::Processed {
            matched: 1,
            emitted: 0
        }
    );
    assert_eq!(sink.len(), 0);
}

#[tokio::test]
async fn unclassified_events_are_acknowledged_without_work() {
    let store = MemoryStore::default();
    store.insert("doc-1", built_document());
    let sink = MemorySink::default();
    let pipeline = pipeline(store, sink.clone());

    let outcome = pipeline
        .process(&event(json!({"jobType": "cron", "state": "success"})))
        .await
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Skipped);
    assert_eq!(sink.len(), 0);
}

#[tokio::test]
async fn deploy_without_artifact_identity_is_skipped() {
    let sink = MemorySink::default();
    let pipeline = pipeline(MemoryStore::default(), sink.clone());

    let outcome = pipeline
        .process(&event(json!({"jobType": "deploy", "state": "healthy"})))
        .await
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Skipped);
    assert_eq!(sink.len(), 0);
}

#[tokio::test]
async fn build_without_commit_is_skipped() {
    let sink = MemorySink::default();
    let pipeline = pipeline(MemoryStore::default(), sink.clone());

    let outcome = pipeline
        .process(&event(json!({
            "groupID": "com.x",
            "appName": "svc",
            "versionNumber": "1.2.3",
            "state": "success"
        })))
        .await
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Skipped);
}

#[tokio::test]
async fn events_matching_nothing_are_still_acknowledged() {
    let sink = MemorySink::default();
    let pipeline = pipeline(MemoryStore::default(), sink.clone());

    let outcome = pipeline
        .process(&event(json!({
            "groupID": "com.x",
            "appName": "svc",
            "versionNumber": "1.2.3",
            "gitCommit": "0000000",
            "state": "success",
            "@timestamp": "2024-02-01T00:00:00Z"
        })))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ProcessOutcome::Processed {
            matched: 0,
            emitted: 0
        }
    );
    assert_eq!(sink.len(), 0);
}

#[tokio::test]
async fn unparseable_timestamps_fail_the_invocation() {
    let store = MemoryStore::default();
    store.insert(
        "doc-1",
        document(json!({
            "started_at": "yesterday",
            "created_at": "2024-01-01T00:10:00Z",
            "builds": [{
                "artifact": {"id": "svc", "group": "com.x", "name": "svc", "version": "1.2.3"},
                "result": "success"
            }]
        })),
    );
    let sink = MemorySink::default();
    let pipeline = pipeline(store, sink.clone());

    let err = pipeline.process(&healthy_deploy()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Merge(_)));
    assert_eq!(err.kind(), "merge");
    assert_eq!(sink.len(), 0);
}

#[tokio::test]
async fn partial_fan_out_failure_keeps_prior_emissions() {
    let store = MemoryStore::default();
    store.insert("doc-1", built_document());
    let mut broken = built_document();
    broken.started_at = Some("not a timestamp".to_owned());
    store.insert("doc-2", broken);
    store.insert("doc-3", built_document());
    let sink = MemorySink::default();
    let pipeline = pipeline(store, sink.clone());

    let err = pipeline.process(&healthy_deploy()).await.unwrap_err();

    // doc-1 was merged and handed to the sink before doc-2 aborted the
    // fan-out; at-least-once, no rollback.
    assert_eq!(err.kind(), "merge");
    assert_eq!(sink.len(), 1);
    assert_eq!(sink.emissions()[0].id, "doc-1");
}

#[tokio::test]
async fn store_failure_fails_the_invocation() {
    let sink = MemorySink::default();
    let pipeline = Pipeline::new(Arc::new(FailingStore), Arc::new(sink.clone()));

    let err = pipeline.process(&healthy_deploy()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Store(_)));
    assert_eq!(err.kind(), "store");
    assert_eq!(sink.len(), 0);
}

#[tokio::test]
async fn sink_failure_fails_the_invocation() {
    let store = MemoryStore::default();
    store.insert("doc-1", built_document());
    let pipeline = Pipeline::new(Arc::new(store), Arc::new(FailingSink));

    let err = pipeline.process(&healthy_deploy()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Sink(_)));
    assert_eq!(err.kind(), "sink");
}
