mod exercise;
mod save;
mod workout_log;

pub use exercise::{ExerciseEntry, RawExercise};
pub use save::{
    OperationType, SaveContext, SaveOptions, SavePerformance, SavePreferences, SaveRequest,
    SaveResult, SaveType, WriteReport,
};
pub use workout_log::{LogId, LogKey, WorkoutDraft, WorkoutLog, WorkoutMetadata, WorkoutSnapshot};
