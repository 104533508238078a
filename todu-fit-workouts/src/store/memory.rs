//! In-memory workout store.
//!
//! Useful for embedding the engine without a database and for tests: every
//! call is recorded, and failures can be scheduled per operation.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{WorkoutStore, EXERCISE_ENTRIES, WORKOUT_LOGS};
use crate::diff::ChangeSet;
use crate::error::PersistenceError;
use crate::models::{ExerciseEntry, LogId, LogKey, WorkoutLog, WorkoutMetadata, WriteReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    FindLog,
    EnsureLogExists,
    WriteExercisesOnly,
    WriteMetadataOnly,
    WriteFull,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreOperation::FindLog => write!(f, "find_log"),
            StoreOperation::EnsureLogExists => write!(f, "ensure_log_exists"),
            StoreOperation::WriteExercisesOnly => write!(f, "write_exercises_only"),
            StoreOperation::WriteMetadataOnly => write!(f, "write_metadata_only"),
            StoreOperation::WriteFull => write!(f, "write_full"),
        }
    }
}

#[derive(Default)]
struct MemoryState {
    logs: HashMap<LogId, WorkoutLog>,
    keys: HashMap<LogKey, LogId>,
    scheduled_failures: HashMap<StoreOperation, usize>,
    calls: Vec<StoreOperation>,
}

impl MemoryState {
    /// Records the call and consumes a scheduled failure, if any.
    fn enter(&mut self, operation: StoreOperation) -> Result<(), PersistenceError> {
        self.calls.push(operation);
        if let Some(remaining) = self.scheduled_failures.get_mut(&operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(PersistenceError::new(
                    operation.to_string(),
                    "simulated failure",
                ));
            }
        }
        Ok(())
    }

    fn log_mut(
        &mut self,
        operation: StoreOperation,
        log_id: &LogId,
    ) -> Result<&mut WorkoutLog, PersistenceError> {
        self.logs.get_mut(log_id).ok_or_else(|| {
            PersistenceError::new(operation.to_string(), format!("log {} not found", log_id))
        })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` calls of `operation` fail.
    pub async fn fail_next(&self, operation: StoreOperation, times: usize) {
        let mut state = self.state.lock().await;
        state.scheduled_failures.insert(operation, times);
    }

    /// Every operation called so far, in order.
    pub async fn calls(&self) -> Vec<StoreOperation> {
        self.state.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Stores `log` as-is, replacing any log with the same key.
    pub async fn insert_log(&self, log: WorkoutLog) {
        let mut state = self.state.lock().await;
        state.keys.insert(log.key.clone(), log.id.clone());
        state.logs.insert(log.id.clone(), log);
    }

    pub async fn log_count(&self) -> usize {
        self.state.lock().await.logs.len()
    }
}

fn with_new_id(entry: &ExerciseEntry) -> ExerciseEntry {
    let mut entry = entry.clone();
    if entry.id.is_none() {
        entry.id = Some(Uuid::new_v4().to_string());
    }
    entry
}

#[async_trait]
impl WorkoutStore for MemoryStore {
    async fn find_log(&self, key: &LogKey) -> Result<Option<WorkoutLog>, PersistenceError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOperation::FindLog)?;

        Ok(state
            .keys
            .get(key)
            .and_then(|id| state.logs.get(id))
            .cloned())
    }

    async fn ensure_log_exists(&self, key: &LogKey) -> Result<LogId, PersistenceError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOperation::EnsureLogExists)?;

        if let Some(id) = state.keys.get(key) {
            return Ok(id.clone());
        }

        let now = Utc::now();
        let log = WorkoutLog {
            id: Uuid::new_v4().to_string(),
            key: key.clone(),
            metadata: WorkoutMetadata::default(),
            exercises: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let id = log.id.clone();
        state.keys.insert(key.clone(), id.clone());
        state.logs.insert(id.clone(), log);
        Ok(id)
    }

    async fn write_exercises_only(
        &self,
        log_id: &LogId,
        changes: &ChangeSet,
    ) -> Result<WriteReport, PersistenceError> {
        let operation = StoreOperation::WriteExercisesOnly;
        let mut state = self.state.lock().await;
        state.enter(operation)?;
        let log = state.log_mut(operation, log_id)?;

        // Build the new list first so a bad update leaves the log untouched.
        let mut exercises: Vec<ExerciseEntry> = log
            .exercises
            .iter()
            .filter(|e| {
                e.id
                    .as_ref()
                    .map_or(true, |id| !changes.to_delete.contains(id))
            })
            .cloned()
            .collect();

        for updated in &changes.to_update {
            let slot = exercises
                .iter_mut()
                .find(|e| e.id.is_some() && e.id == updated.id)
                .ok_or_else(|| {
                    PersistenceError::new(
                        operation.to_string(),
                        format!(
                            "exercise {} not found",
                            updated.id.as_deref().unwrap_or("<none>")
                        ),
                    )
                })?;
            *slot = updated.clone();
        }

        exercises.extend(changes.to_insert.iter().map(with_new_id));
        exercises.sort_by_key(|e| e.order_index);

        log.exercises = exercises;
        log.updated_at = Utc::now();

        Ok(WriteReport::new(changes.change_count(), &[EXERCISE_ENTRIES]))
    }

    async fn write_metadata_only(
        &self,
        log_id: &LogId,
        metadata: &WorkoutMetadata,
    ) -> Result<WriteReport, PersistenceError> {
        let operation = StoreOperation::WriteMetadataOnly;
        let mut state = self.state.lock().await;
        state.enter(operation)?;
        let log = state.log_mut(operation, log_id)?;

        log.metadata = metadata.clone();
        log.updated_at = Utc::now();

        Ok(WriteReport::new(1, &[WORKOUT_LOGS]))
    }

    async fn write_full(
        &self,
        log_id: &LogId,
        metadata: &WorkoutMetadata,
        exercises: &[ExerciseEntry],
    ) -> Result<WriteReport, PersistenceError> {
        let operation = StoreOperation::WriteFull;
        let mut state = self.state.lock().await;
        state.enter(operation)?;
        let log = state.log_mut(operation, log_id)?;

        let mut entries: Vec<ExerciseEntry> = exercises.iter().map(with_new_id).collect();
        entries.sort_by_key(|e| e.order_index);

        log.metadata = metadata.clone();
        log.exercises = entries;
        log.updated_at = Utc::now();

        Ok(WriteReport::new(
            1 + exercises.len(),
            &[WORKOUT_LOGS, EXERCISE_ENTRIES],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> LogKey {
        LogKey::new("user1", "5x5", 0, 0)
    }

    fn entry(id: Option<&str>, exercise_id: &str, order_index: u32) -> ExerciseEntry {
        ExerciseEntry {
            id: id.map(str::to_string),
            exercise_id: exercise_id.to_string(),
            sets: 1,
            reps: vec![Some(5)],
            weights: vec![Some(100.0)],
            completed: vec![false],
            order_index,
            notes: None,
            bodyweight: None,
        }
    }

    #[tokio::test]
    async fn test_find_missing_log_returns_none() {
        let store = MemoryStore::new();
        assert!(store.find_log(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ensure_log_exists_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.ensure_log_exists(&key()).await.unwrap();
        let second = store.ensure_log_exists(&key()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.log_count().await, 1);
    }

    #[tokio::test]
    async fn test_write_full_assigns_ids() {
        let store = MemoryStore::new();
        let log_id = store.ensure_log_exists(&key()).await.unwrap();

        let report = store
            .write_full(
                &log_id,
                &WorkoutMetadata::default().finished(),
                &[entry(None, "squat", 1), entry(None, "bench", 0)],
            )
            .await
            .unwrap();

        assert_eq!(report.rows_written, 3);
        let log = store.find_log(&key()).await.unwrap().unwrap();
        assert!(log.metadata.is_finished);
        assert_eq!(log.exercises.len(), 2);
        assert_eq!(log.exercises[0].exercise_id, "bench");
        assert!(log.exercises.iter().all(|e| e.id.is_some()));
    }

    #[tokio::test]
    async fn test_write_exercises_only_applies_change_set() {
        let store = MemoryStore::new();
        let log_id = store.ensure_log_exists(&key()).await.unwrap();
        store
            .write_full(
                &log_id,
                &WorkoutMetadata::default(),
                &[entry(Some("a"), "squat", 0), entry(Some("b"), "bench", 1)],
            )
            .await
            .unwrap();

        let mut heavier = entry(Some("a"), "squat", 0);
        heavier.weights = vec![Some(110.0)];
        let changes = ChangeSet {
            to_insert: vec![entry(None, "row", 2)],
            to_update: vec![heavier],
            to_delete: vec!["b".to_string()],
            order_changed: false,
        };

        let report = store.write_exercises_only(&log_id, &changes).await.unwrap();
        assert_eq!(report.rows_written, 3);
        assert_eq!(report.collections, vec![EXERCISE_ENTRIES.to_string()]);

        let log = store.find_log(&key()).await.unwrap().unwrap();
        let names: Vec<&str> = log.exercises.iter().map(|e| e.exercise_id.as_str()).collect();
        assert_eq!(names, vec!["squat", "row"]);
        assert_eq!(log.exercises[0].weights, vec![Some(110.0)]);
    }

    #[tokio::test]
    async fn test_update_of_unknown_row_fails_without_changes() {
        let store = MemoryStore::new();
        let log_id = store.ensure_log_exists(&key()).await.unwrap();
        let changes = ChangeSet {
            to_insert: vec![entry(None, "row", 0)],
            to_update: vec![entry(Some("ghost"), "squat", 1)],
            ..Default::default()
        };

        assert!(store.write_exercises_only(&log_id, &changes).await.is_err());
        let log = store.find_log(&key()).await.unwrap().unwrap();
        assert!(log.exercises.is_empty());
    }

    #[tokio::test]
    async fn test_write_to_unknown_log_fails() {
        let store = MemoryStore::new();
        let err = store
            .write_metadata_only(&"nope".to_string(), &WorkoutMetadata::default())
            .await
            .unwrap_err();
        assert_eq!(err.operation, "write_metadata_only");
    }

    #[tokio::test]
    async fn test_scheduled_failures() {
        let store = MemoryStore::new();
        store.fail_next(StoreOperation::EnsureLogExists, 1).await;

        assert!(store.ensure_log_exists(&key()).await.is_err());
        assert!(store.ensure_log_exists(&key()).await.is_ok());
        assert_eq!(
            store.calls().await,
            vec![
                StoreOperation::EnsureLogExists,
                StoreOperation::EnsureLogExists
            ]
        );
    }
}
