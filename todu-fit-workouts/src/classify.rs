//! Labels a detected change with the coarse save classification.
//!
//! The classifier only looks at the diff. Escalations that depend on the
//! stored state (no parent log yet, finished workouts) belong to the
//! strategy selector.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::diff::ChangeSet;
use crate::metadata::MetadataChange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeClassification {
    None,
    ExerciseOnly,
    MetadataOnly,
    FullSave,
}

impl fmt::Display for ChangeClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeClassification::None => write!(f, "none"),
            ChangeClassification::ExerciseOnly => write!(f, "exercise-only"),
            ChangeClassification::MetadataOnly => write!(f, "metadata-only"),
            ChangeClassification::FullSave => write!(f, "full-save"),
        }
    }
}

impl FromStr for ChangeClassification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ChangeClassification::None),
            "exercise-only" => Ok(ChangeClassification::ExerciseOnly),
            "metadata-only" => Ok(ChangeClassification::MetadataOnly),
            "full-save" => Ok(ChangeClassification::FullSave),
            _ => Err(format!("Unknown strategy: {}", s)),
        }
    }
}

/// When insert/delete/reorder activity is heavy enough to rewrite everything.
///
/// Structural weight is `inserts + deletes`, plus one when the order changed.
/// A weight above `max_structural_changes` escalates to full-save; with
/// `deletes_force_full_save` any delete does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuralPolicy {
    pub max_structural_changes: usize,
    pub deletes_force_full_save: bool,
}

impl Default for StructuralPolicy {
    fn default() -> Self {
        Self {
            max_structural_changes: 3,
            deletes_force_full_save: false,
        }
    }
}

impl StructuralPolicy {
    pub fn structural_weight(&self, changes: &ChangeSet) -> usize {
        changes.to_insert.len() + changes.to_delete.len() + usize::from(changes.order_changed)
    }

    pub fn requires_full_save(&self, changes: &ChangeSet) -> bool {
        (self.deletes_force_full_save && !changes.to_delete.is_empty())
            || self.structural_weight(changes) > self.max_structural_changes
    }
}

/// Everything the selector needs to know about one detected change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeAnalysis {
    pub has_exercise_changes: bool,
    pub has_metadata_changes: bool,
    pub exercise_changes: ChangeSet,
    pub metadata_changes: Vec<MetadataChange>,
    pub save_strategy: ChangeClassification,
    pub summary: String,
}

impl ChangeAnalysis {
    /// Checks that the flags, change lists and label agree with each other.
    pub fn check_consistency(&self) -> Result<(), String> {
        if self.has_exercise_changes != self.exercise_changes.has_changes() {
            return Err("exercise change flag does not match the change set".to_string());
        }
        if self.has_metadata_changes == self.metadata_changes.is_empty() {
            return Err("metadata change flag does not match the metadata diff".to_string());
        }

        let consistent = match self.save_strategy {
            ChangeClassification::None => {
                !self.has_exercise_changes && !self.has_metadata_changes
            }
            ChangeClassification::ExerciseOnly => {
                self.has_exercise_changes && !self.has_metadata_changes
            }
            ChangeClassification::MetadataOnly => {
                self.has_metadata_changes && !self.has_exercise_changes
            }
            ChangeClassification::FullSave => {
                self.has_exercise_changes || self.has_metadata_changes
            }
        };

        if consistent {
            Ok(())
        } else {
            Err(format!(
                "classification {} contradicts the detected changes",
                self.save_strategy
            ))
        }
    }
}

pub fn classify(
    changes: &ChangeSet,
    metadata_changes: &[MetadataChange],
    policy: &StructuralPolicy,
) -> ChangeAnalysis {
    let has_exercise_changes = changes.has_changes();
    let has_metadata_changes = !metadata_changes.is_empty();
    let structural = has_exercise_changes && policy.requires_full_save(changes);

    let save_strategy = match (has_exercise_changes, has_metadata_changes) {
        (false, false) => ChangeClassification::None,
        (true, true) => ChangeClassification::FullSave,
        (true, false) if structural => ChangeClassification::FullSave,
        (true, false) => ChangeClassification::ExerciseOnly,
        (false, true) => ChangeClassification::MetadataOnly,
    };

    let mut parts = Vec::new();
    if has_exercise_changes {
        parts.push(format!("exercises: {}", changes.summary()));
    }
    if has_metadata_changes {
        let fields: Vec<&str> = metadata_changes.iter().map(|c| c.field.as_str()).collect();
        parts.push(format!("metadata: {}", fields.join(", ")));
    }
    if structural {
        parts.push(format!(
            "structural weight {} exceeds policy",
            policy.structural_weight(changes)
        ));
    }
    let summary = if parts.is_empty() {
        "no changes".to_string()
    } else {
        parts.join("; ")
    };

    ChangeAnalysis {
        has_exercise_changes,
        has_metadata_changes,
        exercise_changes: changes.clone(),
        metadata_changes: metadata_changes.to_vec(),
        save_strategy,
        summary,
    }
}
