use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::exercise::{ExerciseEntry, RawExercise};

/// Persisted identity of a workout log.
pub type LogId = String;

/// Identifies one scheduled workout occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogKey {
    pub user_id: String,
    pub program_id: String,
    pub week_index: u32,
    pub day_index: u32,
}

impl LogKey {
    pub fn new(
        user_id: impl Into<String>,
        program_id: impl Into<String>,
        week_index: u32,
        day_index: u32,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            program_id: program_id.into(),
            week_index,
            day_index,
        }
    }
}

impl fmt::Display for LogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} week {} day {}",
            self.user_id, self.program_id, self.week_index, self.day_index
        )
    }
}

/// Log-level fields of a workout, written by metadata-only saves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkoutMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(alias = "completedDate", skip_serializing_if = "Option::is_none")]
    pub completed_date: Option<DateTime<Utc>>,
    #[serde(alias = "isFinished")]
    pub is_finished: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(alias = "durationMinutes", skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
}

impl WorkoutMetadata {
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn finished(mut self) -> Self {
        self.is_finished = true;
        self
    }
}

/// The in-progress edit: metadata plus exercises as the editor holds them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkoutDraft {
    pub metadata: WorkoutMetadata,
    pub exercises: Vec<RawExercise>,
}

/// The last persisted state a draft is compared against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkoutSnapshot {
    pub metadata: WorkoutMetadata,
    pub exercises: Vec<ExerciseEntry>,
}

/// Parent record for one workout occurrence, as returned by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutLog {
    pub id: LogId,
    pub key: LogKey,
    pub metadata: WorkoutMetadata,
    pub exercises: Vec<ExerciseEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkoutLog {
    pub fn snapshot(&self) -> WorkoutSnapshot {
        WorkoutSnapshot {
            metadata: self.metadata.clone(),
            exercises: self.exercises.clone(),
        }
    }
}

impl fmt::Display for WorkoutLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Workout Log: {}", self.key)?;
        writeln!(f, "{}", "=".repeat(30))?;
        writeln!(f, "ID: {}", self.id)?;
        if let Some(date) = &self.metadata.date {
            writeln!(f, "Date: {}", date)?;
        }
        let status = if self.metadata.is_finished {
            "finished"
        } else {
            "in progress"
        };
        writeln!(f, "Status: {}", status)?;
        if let Some(completed) = &self.metadata.completed_date {
            writeln!(f, "Completed: {}", completed.to_rfc3339())?;
        }

        if !self.exercises.is_empty() {
            writeln!(f, "\nExercises:")?;
            for exercise in &self.exercises {
                writeln!(f, "  - {}", exercise)?;
            }
        }

        if let Some(notes) = &self.metadata.notes {
            writeln!(f, "\nNotes: {}", notes)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_key_display() {
        let key = LogKey::new("user1", "5x5", 2, 1);
        assert_eq!(key.to_string(), "user1/5x5 week 2 day 1");
    }

    #[test]
    fn test_metadata_defaults() {
        let metadata: WorkoutMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(metadata, WorkoutMetadata::default());
        assert!(!metadata.is_finished);
    }

    #[test]
    fn test_metadata_camel_case_aliases() {
        let metadata: WorkoutMetadata =
            serde_json::from_str(r#"{"isFinished": true, "durationMinutes": 45}"#).unwrap();
        assert!(metadata.is_finished);
        assert_eq!(metadata.duration_minutes, Some(45));
    }

    #[test]
    fn test_workout_log_display() {
        let now = Utc::now();
        let log = WorkoutLog {
            id: "log1".to_string(),
            key: LogKey::new("user1", "5x5", 0, 0),
            metadata: WorkoutMetadata::default()
                .with_date(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap())
                .with_notes("Felt strong"),
            exercises: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let output = format!("{}", log);
        assert!(output.contains("user1/5x5 week 0 day 0"));
        assert!(output.contains("2025-01-15"));
        assert!(output.contains("in progress"));
        assert!(output.contains("Felt strong"));
    }
}
