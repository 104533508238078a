//! Canonicalizes raw exercise records into fixed-shape entries.

use serde_json::Value;

use crate::config::MAX_SETS;
use crate::error::ValidationError;
use crate::models::{ExerciseEntry, RawExercise};

/// Normalizes one raw exercise found at `index` in its list.
///
/// Per-set arrays are padded to `sets` with `None` (`false` for
/// `completed`). Arrays longer than `sets` are rejected, never truncated.
pub fn normalize_exercise(
    raw: &RawExercise,
    index: usize,
) -> Result<ExerciseEntry, ValidationError> {
    let exercise_id = match raw.exercise_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            return Err(ValidationError::new(format!(
                "missing exerciseId at index {}",
                index
            )))
        }
    };

    let sets = coerce_sets(raw.sets.as_ref())?;
    let len = sets as usize;

    let reps = pad("reps", raw.reps.as_deref().unwrap_or(&[]), len, index)?;
    let weights = pad("weights", raw.weights.as_deref().unwrap_or(&[]), len, index)?;
    let completed = pad(
        "completed",
        raw.completed.as_deref().unwrap_or(&[]),
        len,
        index,
    )?
    .into_iter()
    .map(|done| done.unwrap_or(false))
    .collect();

    let order_index = match raw.order_index {
        None => index as u32,
        Some(value) => u32::try_from(value).map_err(|_| {
            ValidationError::new(format!("invalid orderIndex {} at index {}", value, index))
        })?,
    };

    let notes = raw
        .notes
        .as_ref()
        .filter(|notes| !notes.trim().is_empty())
        .cloned();

    Ok(ExerciseEntry {
        id: raw.id.clone().filter(|id| !id.is_empty()),
        exercise_id,
        sets,
        reps,
        weights,
        completed,
        order_index,
        notes,
        bodyweight: raw.bodyweight,
    })
}

/// Normalizes a whole list, failing on the first invalid entry.
pub fn normalize_exercises(raws: &[RawExercise]) -> Result<Vec<ExerciseEntry>, ValidationError> {
    raws.iter()
        .enumerate()
        .map(|(index, raw)| normalize_exercise(raw, index))
        .collect()
}

fn coerce_sets(value: Option<&Value>) -> Result<u32, ValidationError> {
    let coerced = match value {
        Some(Value::Number(n)) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    match coerced.and_then(|n| u32::try_from(n).ok()) {
        Some(n) if (1..=MAX_SETS).contains(&n) => Ok(n),
        _ => {
            let shown = value
                .map(Value::to_string)
                .unwrap_or_else(|| "null".to_string());
            Err(ValidationError::new(format!("invalid sets: {}", shown)))
        }
    }
}

fn pad<T: Clone>(
    field: &str,
    values: &[Option<T>],
    len: usize,
    index: usize,
) -> Result<Vec<Option<T>>, ValidationError> {
    if values.len() > len {
        return Err(ValidationError::new(format!(
            "{} has {} entries but sets is {} at index {}",
            field,
            values.len(),
            len,
            index
        )));
    }
    let mut padded = values.to_vec();
    padded.resize(len, None);
    Ok(padded)
}
