//! Collaborators the save engine writes through.
//!
//! # Persistence
//!
//! A [`WorkoutStore`] owns workout logs and their exercise rows. The engine
//! calls it at most three times per save, sequentially:
//! - `find_log` while building the save context
//! - `ensure_log_exists` when a parent record is needed
//! - one strategy-specific write
//!
//! Stores must make `ensure_log_exists` idempotent and `write_full` atomic.
//! They are not asked to serialize concurrent saves for the same log; callers
//! queue saves per [`LogKey`].
//!
//! # Cache
//!
//! A [`CacheProbe`] reports whether the caller's cached copy of a log can be
//! trusted. Invalidation after a write stays with the caller and is signaled by
//! `SaveResult::cache_updated`.

mod memory;

use async_trait::async_trait;

use crate::diff::ChangeSet;
use crate::error::PersistenceError;
use crate::models::{ExerciseEntry, LogId, LogKey, WorkoutLog, WorkoutMetadata, WriteReport};

pub use memory::{MemoryStore, StoreOperation};

/// Table/collection names reported in write reports.
pub const WORKOUT_LOGS: &str = "workout_logs";
pub const EXERCISE_ENTRIES: &str = "exercise_entries";

#[async_trait]
pub trait WorkoutStore: Send + Sync {
    /// Looks up the log for `key`; `Ok(None)` when none exists yet.
    async fn find_log(&self, key: &LogKey) -> Result<Option<WorkoutLog>, PersistenceError>;

    /// Returns the id of the log for `key`, creating an empty one if needed.
    async fn ensure_log_exists(&self, key: &LogKey) -> Result<LogId, PersistenceError>;

    /// Applies inserts, updates and deletes to the log's exercise rows.
    async fn write_exercises_only(
        &self,
        log_id: &LogId,
        changes: &ChangeSet,
    ) -> Result<WriteReport, PersistenceError>;

    /// Overwrites the log-level fields only.
    async fn write_metadata_only(
        &self,
        log_id: &LogId,
        metadata: &WorkoutMetadata,
    ) -> Result<WriteReport, PersistenceError>;

    /// Replaces metadata and the complete exercise list as one atomic unit.
    async fn write_full(
        &self,
        log_id: &LogId,
        metadata: &WorkoutMetadata,
        exercises: &[ExerciseEntry],
    ) -> Result<WriteReport, PersistenceError>;
}

pub trait CacheProbe: Send + Sync {
    fn is_valid(&self, key: &LogKey) -> bool;
}

/// Cache probe for callers without a cache layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeValid;

impl CacheProbe for AssumeValid {
    fn is_valid(&self, _key: &LogKey) -> bool {
        true
    }
}
