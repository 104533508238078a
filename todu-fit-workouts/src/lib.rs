//! Todu Fit Workouts Library
//!
//! Change detection and save strategy selection for workout logs.

pub mod classify;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod store;
pub mod strategy;

pub use classify::{classify, ChangeAnalysis, ChangeClassification, StructuralPolicy};
pub use config::{EngineConfig, StrategySettings};
pub use diff::{
    compare_exercises, entries_equal, ChangeSet, ChangeSummary, DiffMetadata, DiffOptions,
    ExerciseComparison, UnknownIdPolicy,
};
pub use engine::SaveEngine;
pub use error::{PersistenceError, SaveError, ValidationError};
pub use metadata::{diff_metadata, MetadataChange};
pub use metrics::{MetricsSnapshot, SaveMetrics, StrategySnapshot};
pub use models::{
    ExerciseEntry, LogId, LogKey, OperationType, RawExercise, SaveContext, SaveOptions,
    SavePerformance, SavePreferences, SaveRequest, SaveResult, SaveType, WorkoutDraft, WorkoutLog,
    WorkoutMetadata, WorkoutSnapshot, WriteReport,
};
pub use normalize::{normalize_exercise, normalize_exercises};
pub use store::{AssumeValid, CacheProbe, MemoryStore, WorkoutStore};
pub use strategy::{
    select_strategy, select_strategy_at, select_strategy_for_tag, Priority, SaveStrategy,
    StrategyType,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
