use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::lineage::{ArtifactId, LineageDocument, StoredDocument};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Read access to the lineage documents held in the document-search index.
/// Zero matches is a normal outcome; only transport and decoding faults are
/// errors.
#[async_trait]
pub trait LineageStore {
    /// Documents whose build history contains this exact artifact identity.
    async fn find_by_artifact(
        &self,
        artifact: &ArtifactId,
    ) -> Result<Vec<StoredDocument>, StoreError>;

    /// Documents whose commit history contains this commit id.
    async fn find_by_commit(&self, commit: &str) -> Result<Vec<StoredDocument>, StoreError>;
}

fn artifact_query(artifact: &ArtifactId) -> Value {
    json!({
        "query": {
            "bool": {
                "must": [
                    {"match": {"builds.artifact.id": artifact.id}},
                    {"match": {"builds.artifact.group": artifact.group}},
                    {"match": {"builds.artifact.version": artifact.version}},
                ]
            }
        }
    })
}

fn commit_query(commit: &str) -> Value {
    json!({
        "query": {
            "match": {"commits.id": commit}
        }
    })
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Deserialize)]
struct SearchHits {
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source")]
    source: LineageDocument,
}

/// Client for an Elasticsearch-style search endpoint. The index technology
/// stays behind the `LineageStore` trait; only the predicate shapes above
/// are contract.
pub struct HttpLineageStore {
    client: reqwest::Client,
    search_url: Url,
}

impl HttpLineageStore {
    pub fn new(base_url: &str, index: &str, timeout: Duration) -> Result<Self, StoreError> {
        let base: Url = base_url.parse()?;
        let search_url = base.join(&format!("{}/_search", index))?;

        let client = reqwest::Client::builder()
            .user_agent("leadtime")
            .timeout(timeout)
            .build()?;

        Ok(HttpLineageStore { client, search_url })
    }

    async fn search(&self, query: Value) -> Result<Vec<StoredDocument>, StoreError> {
        debug!(url = %self.search_url, "querying lineage store");

        let response = self
            .client
            .post(self.search_url.clone())
            .json(&query)
            .send()
            .await?
            .error_for_status()?;

        let decoded: SearchResponse = response.json().await?;
        Ok(decoded
            .hits
            .hits
            .into_iter()
            .map(|hit| StoredDocument {
                id: hit.id,
                document: hit.source,
            })
            .collect())
    }
}

#[async_trait]
impl LineageStore for HttpLineageStore {
    async fn find_by_artifact(
        &self,
        artifact: &ArtifactId,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        self.search(artifact_query(artifact)).await
    }

    async fn find_by_commit(&self, commit: &str) -> Result<Vec<StoredDocument>, StoreError> {
        self.search(commit_query(commit)).await
    }
}
