//! Field-level diff of workout log metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::WorkoutMetadata;

/// One metadata field whose value differs between snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataChange {
    pub field: String,
    pub previous: Value,
    pub current: Value,
}

/// Lists the metadata fields that differ.
///
/// A missing previous snapshot compares as the default (empty, unfinished) metadata.
pub fn diff_metadata(
    previous: Option<&WorkoutMetadata>,
    current: &WorkoutMetadata,
) -> Vec<MetadataChange> {
    let default = WorkoutMetadata::default();
    let previous = previous.unwrap_or(&default);
    let mut changes = Vec::new();

    push_if_changed(&mut changes, "date", &previous.date, &current.date);
    push_if_changed(
        &mut changes,
        "completed_date",
        &previous.completed_date,
        &current.completed_date,
    );
    push_if_changed(
        &mut changes,
        "is_finished",
        &previous.is_finished,
        &current.is_finished,
    );
    push_if_changed(&mut changes, "notes", &previous.notes, &current.notes);
    push_if_changed(
        &mut changes,
        "duration_minutes",
        &previous.duration_minutes,
        &current.duration_minutes,
    );

    changes
}

fn push_if_changed<T: PartialEq + Serialize>(
    changes: &mut Vec<MetadataChange>,
    field: &str,
    previous: &T,
    current: &T,
) {
    if previous != current {
        changes.push(MetadataChange {
            field: field.to_string(),
            previous: serde_json::to_value(previous).unwrap_or(Value::Null),
            current: serde_json::to_value(current).unwrap_or(Value::Null),
        });
    }
}
