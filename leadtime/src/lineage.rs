use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The (group, id/name, version) triple identifying a built package. For
/// Maven-style events `id` and `name` are both the application name.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ArtifactId {
    pub id: String,
    pub group: String,
    pub name: String,
    pub version: String,
}

/// One build appended to a lineage document's history.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct BuildRecord {
    pub artifact: ArtifactId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub built_at: Option<String>,
}

/// One deploy appended to a lineage document's history, carrying the
/// lead-time metrics computed at merge time.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DeployRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub completed_at: String,
    /// Seconds from the lineage's `started_at` to deploy completion.
    pub total_time: i64,
    /// Seconds from the lineage's `created_at` to deploy completion.
    pub progress_time: i64,
}

/// The aggregate tracked per software artifact lineage.
///
/// Documents are created by the upstream source-control ingester; this crate
/// appends to `builds` and `deploys` and never deletes entries or originates
/// a document. Everything the upstream owns (commit history, its timestamps,
/// unknown future fields) rides along untouched in `extra`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct LineageDocument {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub builds: Vec<BuildRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deploys: Vec<DeployRecord>,
    /// Pipeline start, set upstream. Read-only here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// First observation of the commit, set upstream. Read-only here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Per-environment snapshots from the previous schema generation.
    /// `deploys` is canonical; these only round-trip for old documents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prod: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qa: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A search hit: the store-assigned document id alongside the decoded
/// document. The id is what lets downstream target the update.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct StoredDocument {
    pub id: String,
    pub document: LineageDocument,
}
