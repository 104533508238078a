use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::fmt;
use uuid::Uuid;

use todu_fit_workouts::diff::ChangeSet;
use todu_fit_workouts::store::{EXERCISE_ENTRIES, WORKOUT_LOGS};
use todu_fit_workouts::{
    ExerciseEntry, LogId, LogKey, PersistenceError, WorkoutLog, WorkoutMetadata, WorkoutStore,
    WriteReport,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed workout store.
pub struct SqliteWorkoutStore {
    pool: SqlitePool,
}

// Row types for database queries
#[derive(sqlx::FromRow)]
struct WorkoutLogRow {
    id: String,
    user_id: String,
    program_id: String,
    week_index: i64,
    day_index: i64,
    date: Option<String>,
    completed_date: Option<String>,
    is_finished: bool,
    notes: Option<String>,
    duration_minutes: Option<i64>,
    created_at: String,
    updated_at: String,
}

#[derive(sqlx::FromRow)]
struct ExerciseRow {
    id: String,
    exercise_id: String,
    sets: i64,
    reps: String,
    weights: String,
    completed: String,
    order_index: i64,
    notes: Option<String>,
    bodyweight: Option<f64>,
}

fn db_error(operation: &'static str) -> impl Fn(sqlx::Error) -> PersistenceError {
    move |e| PersistenceError::new(operation, e.to_string())
}

fn corrupt(log_id: &str, field: &str, detail: impl fmt::Display) -> PersistenceError {
    PersistenceError::new(
        "find_log",
        format!("log {} has a corrupt {}: {}", log_id, field, detail),
    )
}

fn parse_timestamp(
    log_id: &str,
    field: &str,
    value: &str,
) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt(log_id, field, e))
}

/// Decodes a per-set JSON array that must hold exactly `sets` values.
fn parse_per_set<T: DeserializeOwned>(
    log_id: &str,
    field: &str,
    value: &str,
    sets: usize,
) -> Result<Vec<T>, PersistenceError> {
    let values: Vec<T> = serde_json::from_str(value).map_err(|e| corrupt(log_id, field, e))?;
    if values.len() != sets {
        return Err(corrupt(
            log_id,
            field,
            format!("{} entries for {} sets", values.len(), sets),
        ));
    }
    Ok(values)
}

fn hydrate_entry(log_id: &str, row: ExerciseRow) -> Result<ExerciseEntry, PersistenceError> {
    let sets = u32::try_from(row.sets).map_err(|e| corrupt(log_id, "sets", e))?;
    let len = sets as usize;

    Ok(ExerciseEntry {
        reps: parse_per_set(log_id, "reps", &row.reps, len)?,
        weights: parse_per_set(log_id, "weights", &row.weights, len)?,
        completed: parse_per_set(log_id, "completed", &row.completed, len)?,
        order_index: u32::try_from(row.order_index)
            .map_err(|e| corrupt(log_id, "order_index", e))?,
        id: Some(row.id),
        exercise_id: row.exercise_id,
        sets,
        notes: row.notes,
        bodyweight: row.bodyweight,
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "[]".to_string())
}

impl SqliteWorkoutStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn hydrate_log(&self, row: WorkoutLogRow) -> Result<WorkoutLog, PersistenceError> {
        let exercises: Vec<ExerciseRow> = sqlx::query_as(
            r#"
            SELECT id, exercise_id, sets, reps, weights, completed, order_index, notes, bodyweight
            FROM exercise_entries WHERE log_id = ? ORDER BY order_index, id
            "#,
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("find_log"))?;

        let exercises = exercises
            .into_iter()
            .map(|e| hydrate_entry(&row.id, e))
            .collect::<Result<Vec<_>, _>>()?;

        let date = row
            .date
            .as_deref()
            .map(|d| {
                NaiveDate::parse_from_str(d, DATE_FORMAT).map_err(|e| corrupt(&row.id, "date", e))
            })
            .transpose()?;
        let completed_date = row
            .completed_date
            .as_deref()
            .map(|d| parse_timestamp(&row.id, "completed_date", d))
            .transpose()?;
        let created_at = parse_timestamp(&row.id, "created_at", &row.created_at)?;
        let updated_at = parse_timestamp(&row.id, "updated_at", &row.updated_at)?;

        Ok(WorkoutLog {
            key: LogKey::new(
                row.user_id,
                row.program_id,
                row.week_index as u32,
                row.day_index as u32,
            ),
            metadata: WorkoutMetadata {
                date,
                completed_date,
                is_finished: row.is_finished,
                notes: row.notes,
                duration_minutes: row.duration_minutes.map(|m| m as u32),
            },
            exercises,
            created_at,
            updated_at,
            id: row.id,
        })
    }

    /// Bumps `updated_at`; fails when the log doesn't exist.
    async fn touch(
        tx: &mut Transaction<'_, Sqlite>,
        log_id: &str,
    ) -> Result<(), sqlx::Error> {
        let result = sqlx::query("UPDATE workout_logs SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(log_id)
            .execute(&mut **tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    async fn insert_entry(
        tx: &mut Transaction<'_, Sqlite>,
        log_id: &str,
        entry: &ExerciseEntry,
    ) -> Result<(), sqlx::Error> {
        let id = entry
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        sqlx::query(
            r#"
            INSERT INTO exercise_entries (id, log_id, exercise_id, sets, reps, weights, completed, order_index, notes, bodyweight)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(log_id)
        .bind(&entry.exercise_id)
        .bind(entry.sets as i64)
        .bind(to_json(&entry.reps))
        .bind(to_json(&entry.weights))
        .bind(to_json(&entry.completed))
        .bind(entry.order_index as i64)
        .bind(&entry.notes)
        .bind(entry.bodyweight)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl WorkoutStore for SqliteWorkoutStore {
    async fn find_log(&self, key: &LogKey) -> Result<Option<WorkoutLog>, PersistenceError> {
        let on_error = db_error("find_log");

        let row: Option<WorkoutLogRow> = sqlx::query_as(
            r#"
            SELECT * FROM workout_logs
            WHERE user_id = ? AND program_id = ? AND week_index = ? AND day_index = ?
            "#,
        )
        .bind(&key.user_id)
        .bind(&key.program_id)
        .bind(key.week_index as i64)
        .bind(key.day_index as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(&on_error)?;

        match row {
            Some(row) => self.hydrate_log(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn ensure_log_exists(&self, key: &LogKey) -> Result<LogId, PersistenceError> {
        let on_error = db_error("ensure_log_exists");
        let now = Utc::now().to_rfc3339();

        // The unique key makes concurrent creation collapse into one row
        sqlx::query(
            r#"
            INSERT INTO workout_logs (id, user_id, program_id, week_index, day_index, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, program_id, week_index, day_index) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&key.user_id)
        .bind(&key.program_id)
        .bind(key.week_index as i64)
        .bind(key.day_index as i64)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(&on_error)?;

        let (id,): (String,) = sqlx::query_as(
            r#"
            SELECT id FROM workout_logs
            WHERE user_id = ? AND program_id = ? AND week_index = ? AND day_index = ?
            "#,
        )
        .bind(&key.user_id)
        .bind(&key.program_id)
        .bind(key.week_index as i64)
        .bind(key.day_index as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(on_error)?;

        Ok(id)
    }

    async fn write_exercises_only(
        &self,
        log_id: &LogId,
        changes: &ChangeSet,
    ) -> Result<WriteReport, PersistenceError> {
        let operation = "write_exercises_only";
        let on_error = db_error(operation);
        let mut tx = self.pool.begin().await.map_err(&on_error)?;

        for id in &changes.to_delete {
            sqlx::query("DELETE FROM exercise_entries WHERE id = ? AND log_id = ?")
                .bind(id)
                .bind(log_id)
                .execute(&mut *tx)
                .await
                .map_err(&on_error)?;
        }

        for entry in &changes.to_update {
            let Some(id) = entry.id.as_deref() else {
                return Err(PersistenceError::new(operation, "update without an id"));
            };
            let result = sqlx::query(
                r#"
                UPDATE exercise_entries
                SET exercise_id = ?, sets = ?, reps = ?, weights = ?, completed = ?,
                    order_index = ?, notes = ?, bodyweight = ?
                WHERE id = ? AND log_id = ?
                "#,
            )
            .bind(&entry.exercise_id)
            .bind(entry.sets as i64)
            .bind(to_json(&entry.reps))
            .bind(to_json(&entry.weights))
            .bind(to_json(&entry.completed))
            .bind(entry.order_index as i64)
            .bind(&entry.notes)
            .bind(entry.bodyweight)
            .bind(id)
            .bind(log_id)
            .execute(&mut *tx)
            .await
            .map_err(&on_error)?;

            if result.rows_affected() == 0 {
                // Dropping the transaction rolls back the deletes above
                return Err(PersistenceError::new(
                    operation,
                    format!("exercise {} not found in log {}", id, log_id),
                ));
            }
        }

        for entry in &changes.to_insert {
            Self::insert_entry(&mut tx, log_id, entry)
                .await
                .map_err(&on_error)?;
        }

        Self::touch(&mut tx, log_id).await.map_err(&on_error)?;
        tx.commit().await.map_err(on_error)?;

        tracing::debug!(
            "Wrote {} exercise rows for log {}",
            changes.change_count(),
            log_id
        );
        Ok(WriteReport::new(changes.change_count(), &[EXERCISE_ENTRIES]))
    }

    async fn write_metadata_only(
        &self,
        log_id: &LogId,
        metadata: &WorkoutMetadata,
    ) -> Result<WriteReport, PersistenceError> {
        let operation = "write_metadata_only";
        let on_error = db_error(operation);

        let result = sqlx::query(
            r#"
            UPDATE workout_logs
            SET date = ?, completed_date = ?, is_finished = ?, notes = ?, duration_minutes = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(metadata.date.map(|d| d.format(DATE_FORMAT).to_string()))
        .bind(metadata.completed_date.map(|d| d.to_rfc3339()))
        .bind(metadata.is_finished)
        .bind(&metadata.notes)
        .bind(metadata.duration_minutes.map(i64::from))
        .bind(Utc::now().to_rfc3339())
        .bind(log_id)
        .execute(&self.pool)
        .await
        .map_err(on_error)?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::new(
                operation,
                format!("log {} not found", log_id),
            ));
        }

        Ok(WriteReport::new(1, &[WORKOUT_LOGS]))
    }

    async fn write_full(
        &self,
        log_id: &LogId,
        metadata: &WorkoutMetadata,
        exercises: &[ExerciseEntry],
    ) -> Result<WriteReport, PersistenceError> {
        let operation = "write_full";
        let on_error = db_error(operation);
        let mut tx = self.pool.begin().await.map_err(&on_error)?;

        let result = sqlx::query(
            r#"
            UPDATE workout_logs
            SET date = ?, completed_date = ?, is_finished = ?, notes = ?, duration_minutes = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(metadata.date.map(|d| d.format(DATE_FORMAT).to_string()))
        .bind(metadata.completed_date.map(|d| d.to_rfc3339()))
        .bind(metadata.is_finished)
        .bind(&metadata.notes)
        .bind(metadata.duration_minutes.map(i64::from))
        .bind(Utc::now().to_rfc3339())
        .bind(log_id)
        .execute(&mut *tx)
        .await
        .map_err(&on_error)?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::new(
                operation,
                format!("log {} not found", log_id),
            ));
        }

        // Replace exercises
        sqlx::query("DELETE FROM exercise_entries WHERE log_id = ?")
            .bind(log_id)
            .execute(&mut *tx)
            .await
            .map_err(&on_error)?;

        for entry in exercises {
            Self::insert_entry(&mut tx, log_id, entry)
                .await
                .map_err(&on_error)?;
        }

        tx.commit().await.map_err(on_error)?;

        Ok(WriteReport::new(
            1 + exercises.len(),
            &[WORKOUT_LOGS, EXERCISE_ENTRIES],
        ))
    }
}
