use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::event::{BuildEvent, DeployEvent};
use crate::lineage::{BuildRecord, DeployRecord, LineageDocument};
use crate::time::{elapsed_seconds, parse_timestamp};

/// A merge aborts before touching the document when any timestamp it needs
/// is missing or unreadable.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no {0} timestamp to compute lead time from")]
    MissingTimestamp(&'static str),
    #[error("failed to parse {field} timestamp: {source}")]
    UnparseableTimestamp {
        field: &'static str,
        #[source]
        source: chrono::ParseError,
    },
}

/// Deploys report healthy/unhealthy, builds success/failure. Anything else,
/// including an absent state, keeps the document out of the emission path.
pub fn indicates_success(state: Option<&str>) -> bool {
    state.is_some_and(|state| {
        state.eq_ignore_ascii_case("healthy") || state.eq_ignore_ascii_case("success")
    })
}

fn required_timestamp(
    value: Option<&str>,
    field: &'static str,
) -> Result<DateTime<Utc>, MergeError> {
    let raw = value.ok_or(MergeError::MissingTimestamp(field))?;
    parse_timestamp(raw).map_err(|source| MergeError::UnparseableTimestamp { field, source })
}

/// Append the deploy to the document's history along with its lead-time
/// metrics and report whether the update qualifies for emission.
///
/// `total_time` spans `started_at` to completion, `progress_time` spans
/// `created_at` to completion, both in whole seconds. Negative spans from
/// skewed upstream clocks are recorded as-is. An unsuccessful deploy is
/// appended all the same; only emission is withheld.
pub fn merge_deploy(doc: &mut LineageDocument, event: &DeployEvent) -> Result<bool, MergeError> {
    let completed_raw = event
        .completed_at
        .as_deref()
        .ok_or(MergeError::MissingTimestamp("@timestamp"))?;

    let started_at = required_timestamp(doc.started_at.as_deref(), "started_at")?;
    let created_at = required_timestamp(doc.created_at.as_deref(), "created_at")?;
    let completed_at = parse_timestamp(completed_raw).map_err(|source| {
        MergeError::UnparseableTimestamp {
            field: "@timestamp",
            source,
        }
    })?;

    doc.deploys.push(DeployRecord {
        result: event.result.clone(),
        completed_at: completed_raw.to_owned(),
        total_time: elapsed_seconds(started_at, completed_at),
        progress_time: elapsed_seconds(created_at, completed_at),
    });

    Ok(indicates_success(event.result.as_deref()))
}

/// Append the build to the document's history and report whether the update
/// qualifies for emission. Builds carry no lead-time arithmetic, so this
/// never fails.
pub fn merge_build(doc: &mut LineageDocument, event: &BuildEvent) -> bool {
    doc.builds.push(BuildRecord {
        artifact: event.artifact.clone(),
        result: event.result.clone(),
        built_at: event.built_at.clone(),
    });

    indicates_success(event.result.as_deref())
}
