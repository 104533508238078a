use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::workout_log::{LogId, LogKey, WorkoutDraft, WorkoutSnapshot};
use crate::error::ValidationError;

/// What triggered a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveType {
    /// Fired by the editor's debounce timer after a pause in typing.
    Debounced,
    /// Explicit save (navigation away, manual save button).
    Immediate,
    /// The user finished the workout.
    Completion,
}

impl fmt::Display for SaveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveType::Debounced => write!(f, "debounced"),
            SaveType::Immediate => write!(f, "immediate"),
            SaveType::Completion => write!(f, "completion"),
        }
    }
}

impl FromStr for SaveType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debounced" => Ok(SaveType::Debounced),
            "immediate" => Ok(SaveType::Immediate),
            "completion" => Ok(SaveType::Completion),
            _ => Err(ValidationError::new(format!(
                "invalid saveType '{}'. Valid options: debounced, immediate, completion",
                s
            ))),
        }
    }
}

/// Per-request overrides of the engine defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    #[serde(alias = "forceFullSave")]
    pub force_full_save: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    #[serde(alias = "debounceMs", skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
    #[serde(alias = "trackOrderChanges", skip_serializing_if = "Option::is_none")]
    pub track_order_changes: Option<bool>,
}

/// A request to persist the current state of one workout log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRequest {
    #[serde(alias = "userId")]
    pub user_id: String,
    #[serde(alias = "programId")]
    pub program_id: String,
    #[serde(alias = "weekIndex")]
    pub week_index: u32,
    #[serde(alias = "dayIndex")]
    pub day_index: u32,
    #[serde(alias = "currentData")]
    pub current_data: WorkoutDraft,
    #[serde(alias = "previousData", default, skip_serializing_if = "Option::is_none")]
    pub previous_data: Option<WorkoutSnapshot>,
    #[serde(alias = "saveType")]
    pub save_type: SaveType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<SaveOptions>,
}

impl SaveRequest {
    pub fn new(key: LogKey, current_data: WorkoutDraft, save_type: SaveType) -> Self {
        Self {
            user_id: key.user_id,
            program_id: key.program_id,
            week_index: key.week_index,
            day_index: key.day_index,
            current_data,
            previous_data: None,
            save_type,
            options: None,
        }
    }

    pub fn with_previous(mut self, previous: WorkoutSnapshot) -> Self {
        self.previous_data = Some(previous);
        self
    }

    pub fn with_options(mut self, options: SaveOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn key(&self) -> LogKey {
        LogKey::new(
            self.user_id.clone(),
            self.program_id.clone(),
            self.week_index,
            self.day_index,
        )
    }

    /// Checks the fields every save needs before any I/O happens.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.user_id.trim().is_empty() {
            return Err(ValidationError::new("missing required field: userId"));
        }
        if self.program_id.trim().is_empty() {
            return Err(ValidationError::new("missing required field: programId"));
        }
        if let Some(options) = &self.options {
            if let Some(tolerance) = options.tolerance {
                if !tolerance.is_finite() || tolerance < 0.0 {
                    return Err(ValidationError::new(format!(
                        "invalid tolerance: {}",
                        tolerance
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Effective knobs for one save, after request options are applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavePreferences {
    pub tolerance: f64,
    pub track_order_changes: bool,
    pub debounce_ms: u64,
    pub force_full_save: bool,
}

/// What is known about the stored log when a save starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveContext {
    pub has_existing_log: bool,
    pub log_id: Option<LogId>,
    pub is_finished: bool,
    pub last_save_time: Option<DateTime<Utc>>,
    pub cache_valid: bool,
    /// The store could not be read, so `has_existing_log` is a guess.
    pub lookup_failed: bool,
    pub preferences: SavePreferences,
}

/// Rows touched by one collaborator write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReport {
    pub rows_written: usize,
    pub collections: Vec<String>,
}

impl WriteReport {
    pub fn new(rows_written: usize, collections: &[&str]) -> Self {
        Self {
            rows_written,
            collections: collections.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// The persistence operation a save finally performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    NoOp,
    ExerciseOnly,
    MetadataOnly,
    FullSave,
}

impl OperationType {
    /// Exercise-only and metadata-only saves avoid a full rewrite.
    pub fn is_optimized(&self) -> bool {
        matches!(
            self,
            OperationType::ExerciseOnly | OperationType::MetadataOnly
        )
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::NoOp => write!(f, "no-op"),
            OperationType::ExerciseOnly => write!(f, "exercise-only"),
            OperationType::MetadataOnly => write!(f, "metadata-only"),
            OperationType::FullSave => write!(f, "full-save"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavePerformance {
    pub duration_ms: u64,
    pub write_count: usize,
    pub fallback_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_error: Option<String>,
}

/// Outcome of a successful save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveResult {
    pub success: bool,
    pub log_id: Option<LogId>,
    pub operation_type: OperationType,
    pub affected_collections: Vec<String>,
    /// True when rows were written and the caller's cache must be refreshed.
    pub cache_updated: bool,
    pub strategy_reason: String,
    pub performance: SavePerformance,
}

impl fmt::Display for SaveResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Save result: {}", self.operation_type)?;
        if let Some(log_id) = &self.log_id {
            writeln!(f, "Log ID: {}", log_id)?;
        }
        writeln!(f, "Writes: {}", self.performance.write_count)?;
        if !self.affected_collections.is_empty() {
            writeln!(f, "Collections: {}", self.affected_collections.join(", "))?;
        }
        writeln!(f, "Duration: {}ms", self.performance.duration_ms)?;
        writeln!(f, "Reason: {}", self.strategy_reason)?;
        if self.performance.fallback_used {
            writeln!(
                f,
                "Fallback used after: {}",
                self.performance.original_error.as_deref().unwrap_or("unknown error")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SaveRequest {
        SaveRequest::new(
            LogKey::new("user1", "5x5", 0, 1),
            WorkoutDraft::default(),
            SaveType::Debounced,
        )
    }

    #[test]
    fn test_save_type_from_str() {
        assert_eq!(SaveType::from_str("debounced").unwrap(), SaveType::Debounced);
        assert_eq!(SaveType::from_str("IMMEDIATE").unwrap(), SaveType::Immediate);
        assert_eq!(
            SaveType::from_str("Completion").unwrap(),
            SaveType::Completion
        );
    }

    #[test]
    fn test_save_type_from_str_invalid() {
        let err = SaveType::from_str("eventually").unwrap_err();
        assert!(err.message().contains("invalid saveType"));
    }

    #[test]
    fn test_validate_accepts_complete_request() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_user() {
        let mut req = request();
        req.user_id = "  ".to_string();
        let err = req.validate().unwrap_err();
        assert!(err.message().contains("userId"));
    }

    #[test]
    fn test_validate_rejects_negative_tolerance() {
        let req = request().with_options(SaveOptions {
            tolerance: Some(-1.0),
            ..Default::default()
        });
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_request_from_camel_case_json() {
        let req: SaveRequest = serde_json::from_str(
            r#"{
                "userId": "u1",
                "programId": "p1",
                "weekIndex": 1,
                "dayIndex": 2,
                "currentData": {"exercises": [{"exerciseId": "ex1", "sets": 3}]},
                "saveType": "immediate"
            }"#,
        )
        .unwrap();
        assert_eq!(req.key(), LogKey::new("u1", "p1", 1, 2));
        assert_eq!(req.save_type, SaveType::Immediate);
        assert_eq!(req.current_data.exercises.len(), 1);
        assert!(req.previous_data.is_none());
    }

    #[test]
    fn test_unknown_save_type_rejected_by_serde() {
        let result: Result<SaveRequest, _> = serde_json::from_str(
            r#"{"userId": "u1", "programId": "p1", "weekIndex": 0, "dayIndex": 0,
                "currentData": {}, "saveType": "later"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_operation_type_is_optimized() {
        assert!(OperationType::ExerciseOnly.is_optimized());
        assert!(OperationType::MetadataOnly.is_optimized());
        assert!(!OperationType::FullSave.is_optimized());
        assert!(!OperationType::NoOp.is_optimized());
    }

    #[test]
    fn test_operation_type_serializes_kebab_case() {
        let json = serde_json::to_string(&OperationType::ExerciseOnly).unwrap();
        assert_eq!(json, "\"exercise-only\"");
    }
}
