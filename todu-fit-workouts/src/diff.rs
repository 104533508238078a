//! Tolerance-aware diff of ordered, id-addressed exercise lists.
//!
//! The diff is pure and O(n): one id-keyed lookup of the persisted snapshot,
//! one pass over the normalized edit, one sweep for deletions.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Instant;

use crate::config::DEFAULT_TOLERANCE;
use crate::error::ValidationError;
use crate::models::{ExerciseEntry, RawExercise};
use crate::normalize::normalize_exercises;

/// What to do with an edited entry whose id the snapshot doesn't know.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownIdPolicy {
    /// Drop the stale id and insert the entry as new.
    #[default]
    Insert,
    /// Fail the diff with a validation error.
    Reject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiffOptions {
    pub tolerance: f64,
    pub track_order_changes: bool,
    pub unknown_id_policy: UnknownIdPolicy,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            track_order_changes: true,
            unknown_id_policy: UnknownIdPolicy::Insert,
        }
    }
}

/// Inserts, updates, deletes and reorder flag between two snapshots.
///
/// `to_update` and `to_delete` never share an id, and every id in
/// `to_delete` came from the persisted snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub to_insert: Vec<ExerciseEntry>,
    pub to_update: Vec<ExerciseEntry>,
    pub to_delete: Vec<String>,
    pub order_changed: bool,
}

impl ChangeSet {
    pub fn has_changes(&self) -> bool {
        self.change_count() > 0 || self.order_changed
    }

    /// Rows an exercise-only write would touch.
    pub fn change_count(&self) -> usize {
        self.to_insert.len() + self.to_update.len() + self.to_delete.len()
    }

    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary {
            inserted: self.to_insert.len(),
            updated: self.to_update.len(),
            deleted: self.to_delete.len(),
            order_changed: self.order_changed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub order_changed: bool,
}

impl fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} updated, {} removed",
            self.inserted, self.updated, self.deleted
        )?;
        if self.order_changed {
            write!(f, ", reordered")?;
        }
        Ok(())
    }
}

/// Observability data for one diff run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffMetadata {
    pub duration_micros: u64,
    pub existing_count: usize,
    pub updated_count: usize,
    pub change_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseComparison {
    pub has_changes: bool,
    pub changes: ChangeSet,
    pub summary: ChangeSummary,
    pub metadata: DiffMetadata,
}

/// Compares the persisted exercise list with an edited one.
///
/// `None` on either side is an empty list. The edited list is normalized
/// first; a normalization failure aborts the diff.
pub fn compare_exercises(
    existing: Option<&[ExerciseEntry]>,
    updated: Option<&[RawExercise]>,
    options: &DiffOptions,
) -> Result<ExerciseComparison, ValidationError> {
    let started = Instant::now();
    let existing = existing.unwrap_or(&[]);
    let mut updated = normalize_exercises(updated.unwrap_or(&[]))?;
    let updated_count = updated.len();

    let lookup: HashMap<&str, &ExerciseEntry> = existing
        .iter()
        .filter_map(|entry| entry.id.as_deref().map(|id| (id, entry)))
        .collect();

    let order_changed =
        options.track_order_changes && relative_order_changed(existing, &updated, &lookup);
    if order_changed {
        // Stores sort by order_index alone, so the new order has to live there.
        rank_order_indexes(&mut updated);
    }

    let mut changes = ChangeSet {
        order_changed,
        ..Default::default()
    };
    let mut seen: HashSet<String> = HashSet::new();

    for (index, mut entry) in updated.into_iter().enumerate() {
        let Some(id) = entry.id.clone() else {
            changes.to_insert.push(entry);
            continue;
        };

        if !seen.insert(id.clone()) {
            return Err(ValidationError::new(format!(
                "duplicate exercise id {} at index {}",
                id, index
            )));
        }

        match lookup.get(id.as_str()) {
            Some(previous) => {
                if !entries_equal(previous, &entry, options.tolerance) {
                    changes.to_update.push(entry);
                }
            }
            None => match options.unknown_id_policy {
                UnknownIdPolicy::Insert => {
                    tracing::debug!("Unknown exercise id {} at index {}, inserting", id, index);
                    entry.id = None;
                    changes.to_insert.push(entry);
                }
                UnknownIdPolicy::Reject => {
                    return Err(ValidationError::new(format!(
                        "unknown exercise id {} at index {}",
                        id, index
                    )));
                }
            },
        }
    }

    let mut deleted: HashSet<&str> = HashSet::new();
    for entry in existing {
        if let Some(id) = entry.id.as_deref() {
            if !seen.contains(id) && deleted.insert(id) {
                changes.to_delete.push(id.to_string());
            }
        }
    }

    let summary = changes.summary();
    let metadata = DiffMetadata {
        duration_micros: started.elapsed().as_micros() as u64,
        existing_count: existing.len(),
        updated_count,
        change_count: changes.change_count(),
    };

    tracing::debug!(
        "Exercise diff: {} ({} existing, {} updated) in {}us",
        summary,
        metadata.existing_count,
        metadata.updated_count,
        metadata.duration_micros
    );

    Ok(ExerciseComparison {
        has_changes: changes.has_changes(),
        changes,
        summary,
        metadata,
    })
}

/// Field-level equality, with numeric fields compared within `tolerance`.
///
/// A difference of exactly `tolerance` counts as equal. The bound is widened
/// by a few ulps of the compared magnitude so decimal inputs like `105.001`
/// against `105.0` land on the equal side despite binary rounding.
pub fn entries_equal(a: &ExerciseEntry, b: &ExerciseEntry, tolerance: f64) -> bool {
    a.exercise_id == b.exercise_id
        && a.sets == b.sets
        && a.order_index == b.order_index
        && a.reps == b.reps
        && a.completed == b.completed
        && a.notes == b.notes
        && approx_eq(a.bodyweight, b.bodyweight, tolerance)
        && a.weights.len() == b.weights.len()
        && a
            .weights
            .iter()
            .zip(&b.weights)
            .all(|(x, y)| approx_eq(*x, *y, tolerance))
}

fn approx_eq(a: Option<f64>, b: Option<f64>, tolerance: f64) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => {
            let slack = 4.0 * f64::EPSILON * x.abs().max(y.abs()).max(1.0);
            (x - y).abs() <= tolerance + slack
        }
        _ => false,
    }
}

/// Rewrites `order_index` as the dense rank of `(order_index, position)`.
///
/// Ties are broken by list position, so the result is unambiguous.
pub fn rank_order_indexes(entries: &mut [ExerciseEntry]) {
    let mut positions: Vec<usize> = (0..entries.len()).collect();
    positions.sort_by_key(|&position| (entries[position].order_index, position));
    for (rank, position) in positions.into_iter().enumerate() {
        entries[position].order_index = rank as u32;
    }
}

/// True when ids present in both snapshots appear in a different relative order.
fn relative_order_changed(
    existing: &[ExerciseEntry],
    updated: &[ExerciseEntry],
    lookup: &HashMap<&str, &ExerciseEntry>,
) -> bool {
    let updated_ids: HashSet<&str> = updated
        .iter()
        .filter_map(|entry| entry.id.as_deref())
        .filter(|id| lookup.contains_key(id))
        .collect();

    let before = ordered_ids(existing, |id| updated_ids.contains(id));
    let after = ordered_ids(updated, |id| updated_ids.contains(id));
    before != after
}

fn ordered_ids<'a>(entries: &'a [ExerciseEntry], keep: impl Fn(&str) -> bool) -> Vec<&'a str> {
    let mut keyed: Vec<(u32, usize, &str)> = entries
        .iter()
        .enumerate()
        .filter_map(|(position, entry)| {
            entry
                .id
                .as_deref()
                .filter(|id| keep(id))
                .map(|id| (entry.order_index, position, id))
        })
        .collect();
    keyed.sort();

    let mut ids: Vec<&str> = keyed.into_iter().map(|(_, _, id)| id).collect();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_exercise;

    fn stored(id: &str, exercise_id: &str, weights: Vec<f64>, order_index: u32) -> ExerciseEntry {
        let sets = weights.len() as u32;
        ExerciseEntry {
            id: Some(id.to_string()),
            exercise_id: exercise_id.to_string(),
            sets,
            reps: vec![Some(10); sets as usize],
            weights: weights.into_iter().map(Some).collect(),
            completed: vec![true; sets as usize],
            order_index,
            notes: None,
            bodyweight: None,
        }
    }

    fn raw(entries: &[ExerciseEntry]) -> Vec<RawExercise> {
        entries.iter().map(RawExercise::from).collect()
    }

    #[test]
    fn test_new_exercise_is_insert() {
        let updated = vec![RawExercise::new("ex1", 3)
            .with_reps(vec![Some(10), Some(12), Some(8)])
            .with_weights(vec![Some(100.0), Some(105.0), Some(95.0)])
            .with_completed(vec![true, true, false])
            .with_order_index(0)];

        let result = compare_exercises(
            Some(Vec::<ExerciseEntry>::new().as_slice()),
            Some(updated.as_slice()),
            &DiffOptions::default(),
        )
        .unwrap();

        assert!(result.has_changes);
        assert_eq!(result.changes.to_insert.len(), 1);
        assert!(result.changes.to_update.is_empty());
        assert!(result.changes.to_delete.is_empty());
    }

    #[test]
    fn test_weights_within_tolerance_are_unchanged() {
        let existing = vec![ExerciseEntry {
            reps: vec![Some(10), Some(12)],
            ..stored("db1", "ex1", vec![100.0, 105.0], 0)
        }];
        let mut edited = existing[0].clone();
        edited.weights = vec![Some(100.0008), Some(105.0008)];

        let result = compare_exercises(
            Some(existing.as_slice()),
            Some(raw(&[edited]).as_slice()),
            &DiffOptions::default(),
        )
        .unwrap();

        assert!(!result.has_changes);
    }

    #[test]
    fn test_weights_beyond_tolerance_update() {
        let existing = vec![stored("db1", "ex1", vec![100.0, 105.0], 0)];
        let mut edited = existing[0].clone();
        edited.weights[1] = Some(105.01);

        let result = compare_exercises(
            Some(existing.as_slice()),
            Some(raw(&[edited]).as_slice()),
            &DiffOptions::default(),
        )
        .unwrap();

        assert!(result.has_changes);
        assert_eq!(result.changes.to_update.len(), 1);
        assert_eq!(result.changes.to_update[0].id.as_deref(), Some("db1"));
    }

    #[test]
    fn test_tolerance_boundary() {
        let existing = vec![stored("db1", "ex1", vec![105.0], 0)];

        let mut at_bound = existing[0].clone();
        at_bound.weights = vec![Some(105.001)];
        let result = compare_exercises(
            Some(existing.as_slice()),
            Some(raw(&[at_bound]).as_slice()),
            &DiffOptions::default(),
        )
        .unwrap();
        assert!(!result.has_changes);

        let mut past_bound = existing[0].clone();
        past_bound.weights = vec![Some(105.0011)];
        let result = compare_exercises(
            Some(existing.as_slice()),
            Some(raw(&[past_bound]).as_slice()),
            &DiffOptions::default(),
        )
        .unwrap();
        assert_eq!(result.changes.to_update.len(), 1);
    }

    #[test]
    fn test_omitted_exercise_is_delete() {
        let existing = vec![
            stored("db1", "ex1", vec![100.0], 0),
            stored("db2", "ex2", vec![50.0], 1),
        ];

        let result = compare_exercises(
            Some(existing.as_slice()),
            Some(raw(&existing[..1]).as_slice()),
            &DiffOptions::default(),
        )
        .unwrap();

        assert_eq!(result.changes.to_delete, vec!["db2".to_string()]);
        assert!(result.changes.to_insert.is_empty());
        assert!(result.changes.to_update.is_empty());
        assert!(result.has_changes);
    }

    #[test]
    fn test_none_inputs_are_empty() {
        let result = compare_exercises(None, None, &DiffOptions::default()).unwrap();
        assert!(!result.has_changes);
        assert_eq!(result.metadata.existing_count, 0);
        assert_eq!(result.metadata.updated_count, 0);

        let existing = vec![stored("db1", "ex1", vec![100.0], 0)];
        let result = compare_exercises(
            Some(existing.as_slice()),
            None,
            &DiffOptions::default(),
        )
        .unwrap();
        assert_eq!(result.changes.to_delete, vec!["db1".to_string()]);
    }

    #[test]
    fn test_self_diff_has_no_changes() {
        let raws = vec![
            RawExercise::new("squat", 3).with_weights(vec![Some(100.0)]),
            RawExercise::new("bench", 2).with_reps(vec![Some(8), Some(8)]),
        ];
        let normalized: Vec<ExerciseEntry> = raws
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let mut entry = normalize_exercise(r, i).unwrap();
                entry.id = Some(format!("db{}", i));
                entry
            })
            .collect();

        let result = compare_exercises(
            Some(normalized.as_slice()),
            Some(raw(&normalized).as_slice()),
            &DiffOptions::default(),
        )
        .unwrap();

        assert!(!result.has_changes);
        assert_eq!(result.summary, ChangeSummary::default());
    }

    #[test]
    fn test_diff_is_deterministic() {
        let existing = vec![
            stored("db1", "ex1", vec![100.0], 0),
            stored("db2", "ex2", vec![50.0], 1),
            stored("db3", "ex3", vec![20.0], 2),
        ];
        let mut edited = raw(&existing[1..]);
        edited[0].weights = Some(vec![Some(55.0)]);
        edited.push(RawExercise::new("ex4", 1));

        let first = compare_exercises(
            Some(existing.as_slice()),
            Some(edited.as_slice()),
            &DiffOptions::default(),
        )
        .unwrap();
        let second = compare_exercises(
            Some(existing.as_slice()),
            Some(edited.as_slice()),
            &DiffOptions::default(),
        )
        .unwrap();

        assert_eq!(first.changes, second.changes);
    }

    #[test]
    fn test_conservation() {
        let existing = vec![
            stored("db1", "ex1", vec![100.0], 0),
            stored("db2", "ex2", vec![50.0], 1),
            stored("db3", "ex3", vec![20.0], 2),
        ];
        let mut edited = raw(&existing[..2]);
        edited[0].notes = Some("heavy".to_string());
        edited.push(RawExercise::new("ex9", 2));

        let result = compare_exercises(
            Some(existing.as_slice()),
            Some(edited.as_slice()),
            &DiffOptions::default(),
        )
        .unwrap();
        let changes = &result.changes;

        assert!(changes.to_update.len() + changes.to_delete.len() <= existing.len());
        for id in &changes.to_delete {
            assert!(existing.iter().any(|e| e.id.as_deref() == Some(id.as_str())));
            assert!(!edited.iter().any(|e| e.id.as_deref() == Some(id.as_str())));
        }
        for updated in &changes.to_update {
            assert!(!changes.to_delete.contains(updated.id.as_ref().unwrap()));
        }
    }

    #[test]
    fn test_reorder_detected() {
        let existing = vec![
            stored("db1", "ex1", vec![100.0], 0),
            stored("db2", "ex2", vec![50.0], 1),
        ];
        let mut edited = raw(&existing);
        edited[0].order_index = Some(1);
        edited[1].order_index = Some(0);

        let result = compare_exercises(
            Some(existing.as_slice()),
            Some(edited.as_slice()),
            &DiffOptions::default(),
        )
        .unwrap();

        assert!(result.changes.order_changed);
        assert_eq!(result.changes.to_update.len(), 2);
        assert!(result.summary.to_string().contains("reordered"));
    }

    #[test]
    fn test_reorder_with_tied_order_index_rewrites_ranks() {
        let existing = vec![
            stored("db1", "squat", vec![100.0], 0),
            stored("db2", "bench", vec![60.0], 0),
        ];
        let edited = raw(&[existing[1].clone(), existing[0].clone()]);

        let result = compare_exercises(
            Some(existing.as_slice()),
            Some(edited.as_slice()),
            &DiffOptions::default(),
        )
        .unwrap();

        assert!(result.changes.order_changed);
        assert_eq!(result.changes.to_update.len(), 1);
        assert_eq!(result.changes.to_update[0].id.as_deref(), Some("db1"));
        assert_eq!(result.changes.to_update[0].order_index, 1);
    }

    #[test]
    fn test_rank_order_indexes_breaks_ties_by_position() {
        let mut entries = vec![
            stored("a", "ex1", vec![1.0], 5),
            stored("b", "ex2", vec![1.0], 0),
            stored("c", "ex3", vec![1.0], 5),
        ];
        rank_order_indexes(&mut entries);
        let ranks: Vec<u32> = entries.iter().map(|e| e.order_index).collect();
        assert_eq!(ranks, vec![1, 0, 2]);
    }

    #[test]
    fn test_reorder_ignored_when_tracking_disabled() {
        let existing = vec![
            stored("db1", "ex1", vec![100.0], 0),
            stored("db2", "ex2", vec![50.0], 1),
        ];
        let mut edited = raw(&existing);
        edited.swap(0, 1);
        edited[0].order_index = Some(0);
        edited[1].order_index = Some(1);
        let options = DiffOptions {
            track_order_changes: false,
            ..Default::default()
        };

        let result = compare_exercises(
            Some(existing.as_slice()),
            Some(edited.as_slice()),
            &options,
        )
        .unwrap();

        assert!(!result.changes.order_changed);
        assert!(result.has_changes);
    }

    #[test]
    fn test_delete_does_not_count_as_reorder() {
        let existing = vec![
            stored("db1", "ex1", vec![100.0], 0),
            stored("db2", "ex2", vec![50.0], 1),
            stored("db3", "ex3", vec![20.0], 2),
        ];
        let edited = raw(&[existing[0].clone(), existing[2].clone()]);

        let result = compare_exercises(
            Some(existing.as_slice()),
            Some(edited.as_slice()),
            &DiffOptions::default(),
        )
        .unwrap();

        assert!(!result.changes.order_changed);
        assert_eq!(result.changes.to_delete, vec!["db2".to_string()]);
    }

    #[test]
    fn test_unknown_id_inserted_by_default() {
        let existing = vec![stored("db1", "ex1", vec![100.0], 0)];
        let mut edited = raw(&existing);
        edited.push(RawExercise::new("ex2", 1).with_id("foreign"));

        let result = compare_exercises(
            Some(existing.as_slice()),
            Some(edited.as_slice()),
            &DiffOptions::default(),
        )
        .unwrap();

        assert_eq!(result.changes.to_insert.len(), 1);
        assert!(result.changes.to_insert[0].id.is_none());
        assert!(result.changes.to_delete.is_empty());
    }

    #[test]
    fn test_unknown_id_rejected_by_policy() {
        let edited = vec![RawExercise::new("ex2", 1).with_id("foreign")];
        let options = DiffOptions {
            unknown_id_policy: UnknownIdPolicy::Reject,
            ..Default::default()
        };

        let err = compare_exercises(None, Some(edited.as_slice()), &options).unwrap_err();
        assert!(err.message().contains("unknown exercise id foreign"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let existing = vec![stored("db1", "ex1", vec![100.0], 0)];
        let mut edited = raw(&existing);
        edited.push(edited[0].clone());

        let err = compare_exercises(
            Some(existing.as_slice()),
            Some(edited.as_slice()),
            &DiffOptions::default(),
        )
        .unwrap_err();
        assert!(err.message().contains("duplicate exercise id db1"));
    }

    #[test]
    fn test_invalid_entry_aborts_diff() {
        let edited = vec![RawExercise::default()];
        let err = compare_exercises(
            None,
            Some(edited.as_slice()),
            &DiffOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.message(), "missing exerciseId at index 0");
    }

    #[test]
    fn test_completed_toggle_is_update() {
        let existing = vec![stored("db1", "ex1", vec![100.0, 100.0], 0)];
        let mut edited = existing[0].clone();
        edited.completed[1] = false;

        let result = compare_exercises(
            Some(existing.as_slice()),
            Some(raw(&[edited]).as_slice()),
            &DiffOptions::default(),
        )
        .unwrap();

        assert_eq!(result.changes.to_update.len(), 1);
    }

    #[test]
    fn test_metadata_counts() {
        let existing = vec![stored("db1", "ex1", vec![100.0], 0)];
        let edited = vec![RawExercise::new("ex2", 1), RawExercise::new("ex3", 1)];

        let result = compare_exercises(
            Some(existing.as_slice()),
            Some(edited.as_slice()),
            &DiffOptions::default(),
        )
        .unwrap();

        assert_eq!(result.metadata.existing_count, 1);
        assert_eq!(result.metadata.updated_count, 2);
        assert_eq!(result.metadata.change_count, 3);
    }
}
