use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Exercise data as it arrives from the editor, before normalization.
///
/// Every field is optional and `sets` may be any JSON value; the normalizer
/// decides what is acceptable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawExercise {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "exerciseId", skip_serializing_if = "Option::is_none")]
    pub exercise_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sets: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reps: Option<Vec<Option<u32>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<Option<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<Vec<Option<bool>>>,
    #[serde(alias = "orderIndex", skip_serializing_if = "Option::is_none")]
    pub order_index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bodyweight: Option<f64>,
}

impl RawExercise {
    pub fn new(exercise_id: impl Into<String>, sets: u32) -> Self {
        Self {
            exercise_id: Some(exercise_id.into()),
            sets: Some(Value::from(sets)),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_reps(mut self, reps: Vec<Option<u32>>) -> Self {
        self.reps = Some(reps);
        self
    }

    pub fn with_weights(mut self, weights: Vec<Option<f64>>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_completed(mut self, completed: Vec<bool>) -> Self {
        self.completed = Some(completed.into_iter().map(Some).collect());
        self
    }

    pub fn with_order_index(mut self, order_index: i64) -> Self {
        self.order_index = Some(order_index);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_bodyweight(mut self, bodyweight: f64) -> Self {
        self.bodyweight = Some(bodyweight);
        self
    }
}

impl From<&ExerciseEntry> for RawExercise {
    fn from(entry: &ExerciseEntry) -> Self {
        Self {
            id: entry.id.clone(),
            exercise_id: Some(entry.exercise_id.clone()),
            sets: Some(Value::from(entry.sets)),
            reps: Some(entry.reps.clone()),
            weights: Some(entry.weights.clone()),
            completed: Some(entry.completed.iter().copied().map(Some).collect()),
            order_index: Some(entry.order_index as i64),
            notes: entry.notes.clone(),
            bodyweight: entry.bodyweight,
        }
    }
}

/// One exercise's per-set data within a workout log, in canonical shape.
///
/// `reps`, `weights` and `completed` always have exactly `sets` elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseEntry {
    /// Persisted identity; `None` until the store has written the row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "exerciseId")]
    pub exercise_id: String,
    pub sets: u32,
    pub reps: Vec<Option<u32>>,
    pub weights: Vec<Option<f64>>,
    pub completed: Vec<bool>,
    #[serde(alias = "orderIndex")]
    pub order_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bodyweight: Option<f64>,
}

impl ExerciseEntry {
    /// Number of sets marked completed.
    pub fn completed_sets(&self) -> usize {
        self.completed.iter().filter(|done| **done).count()
    }
}

impl fmt::Display for ExerciseEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} ({}/{} sets done)",
            self.order_index,
            self.exercise_id,
            self.completed_sets(),
            self.sets
        )?;
        if let Some(id) = &self.id {
            write!(f, " [{}]", id)?;
        }
        Ok(())
    }
}
