use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::lineage::ArtifactId;

/// A decoded CI webhook notification. The host transport owns request
/// decoding; by the time an event reaches this crate it is structured, and
/// every field is optional on the wire. Immutable once received.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CiEvent {
    #[serde(rename = "jobType", skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,
    #[serde(rename = "appName", skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(rename = "groupID", skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(rename = "versionNumber", skip_serializing_if = "Option::is_none")]
    pub version_number: Option<String>,
    #[serde(rename = "gitCommit", skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "@timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// A deploy notification, correlated by the artifact it rolled out.
#[derive(Clone, Debug, PartialEq)]
pub struct DeployEvent {
    /// Present only when the event carried the full appName/groupID/
    /// versionNumber triple. Without it there is nothing to correlate.
    pub artifact: Option<ArtifactId>,
    pub result: Option<String>,
    pub completed_at: Option<String>,
}

/// A recognized Maven-style build notification, correlated by commit.
#[derive(Clone, Debug, PartialEq)]
pub struct BuildEvent {
    pub commit: Option<String>,
    pub artifact: ArtifactId,
    pub result: Option<String>,
    pub built_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClassifiedEvent {
    Deploy(DeployEvent),
    Build(BuildEvent),
    /// Non-Maven build or unknown job type. Nothing to correlate, not an
    /// error.
    Unclassified,
}

impl CiEvent {
    fn artifact(&self) -> Option<ArtifactId> {
        match (&self.app_name, &self.group_id, &self.version_number) {
            (Some(app), Some(group), Some(version)) => Some(ArtifactId {
                id: app.clone(),
                group: group.clone(),
                name: app.clone(),
                version: version.clone(),
            }),
            _ => None,
        }
    }

    /// Determine the event's kind: a deploy when `jobType` says so, a build
    /// when `jobType` is absent and the Maven identity triple is complete,
    /// unclassified otherwise.
    pub fn classify(&self) -> ClassifiedEvent {
        match self.job_type.as_deref() {
            Some("deploy") => ClassifiedEvent::Deploy(DeployEvent {
                artifact: self.artifact(),
                result: self.state.clone(),
                completed_at: self.timestamp.clone(),
            }),
            Some(_) => ClassifiedEvent::Unclassified,
            None => match self.artifact() {
                Some(artifact) => ClassifiedEvent::Build(BuildEvent {
                    commit: self.git_commit.clone(),
                    artifact,
                    result: self.state.clone(),
                    built_at: self.timestamp.clone(),
                }),
                None => ClassifiedEvent::Unclassified,
            },
        }
    }
}
