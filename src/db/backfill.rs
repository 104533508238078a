//! One-off data migration: fill `completed_date` from `date` on old logs.
//!
//! Logs saved before completion timestamps existed only carry the workout
//! date. Pages through `workout_logs` by id and commits one transaction per
//! page that has something to update. Running it again is a no-op.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::SqlitePool;

pub const DEFAULT_BATCH_SIZE: u32 = 400;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillSummary {
    /// Logs scanned across all pages.
    pub logs_processed: u64,
    pub logs_updated: u64,
    /// Committed update batches; pages with nothing to change are not counted.
    pub batches: u64,
}

#[derive(sqlx::FromRow)]
struct BackfillRow {
    id: String,
    date: Option<String>,
    completed_date: Option<String>,
}

impl BackfillRow {
    /// Completion timestamp derived from the workout date, if one is needed.
    fn completed_date(&self) -> Option<String> {
        if self.completed_date.is_some() {
            return None;
        }
        let date = NaiveDate::parse_from_str(self.date.as_deref()?, "%Y-%m-%d").ok()?;
        Some(date.and_hms_opt(0, 0, 0)?.and_utc().to_rfc3339())
    }
}

pub async fn backfill_completed_date(
    pool: &SqlitePool,
    batch_size: u32,
) -> Result<BackfillSummary, sqlx::Error> {
    let batch_size = batch_size.max(1);
    let mut summary = BackfillSummary::default();
    let mut last_id: Option<String> = None;

    loop {
        let rows: Vec<BackfillRow> = sqlx::query_as(
            r#"
            SELECT id, date, completed_date FROM workout_logs
            WHERE ? IS NULL OR id > ?
            ORDER BY id
            LIMIT ?
            "#,
        )
        .bind(&last_id)
        .bind(&last_id)
        .bind(batch_size as i64)
        .fetch_all(pool)
        .await?;

        let Some(last) = rows.last() else {
            break;
        };
        last_id = Some(last.id.clone());

        let updates: Vec<(&str, String)> = rows
            .iter()
            .filter_map(|row| row.completed_date().map(|d| (row.id.as_str(), d)))
            .collect();

        if updates.is_empty() {
            tracing::debug!("No logs needing update in this batch");
        } else {
            let mut tx = pool.begin().await?;
            for (id, completed_date) in &updates {
                sqlx::query(
                    "UPDATE workout_logs SET completed_date = ? WHERE id = ? AND completed_date IS NULL",
                )
                .bind(completed_date)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;

            summary.logs_updated += updates.len() as u64;
            summary.batches += 1;
            tracing::info!("Committed batch of {} updates", updates.len());
        }

        summary.logs_processed += rows.len() as u64;
        if rows.len() < batch_size as usize {
            break;
        }
    }

    tracing::info!(
        "Backfill complete: processed {} logs, updated {}",
        summary.logs_processed,
        summary.logs_updated
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use tempfile::TempDir;

    async fn setup_pool() -> (SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        (pool, temp_dir)
    }

    async fn insert_log(
        pool: &SqlitePool,
        id: &str,
        day: i64,
        date: Option<&str>,
        completed: Option<&str>,
    ) {
        sqlx::query(
            r#"
            INSERT INTO workout_logs (id, user_id, program_id, week_index, day_index, date, completed_date, created_at, updated_at)
            VALUES (?, 'user1', 'p1', 0, ?, ?, ?, '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00')
            "#,
        )
        .bind(id)
        .bind(day)
        .bind(date)
        .bind(completed)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn completed_date(pool: &SqlitePool, id: &str) -> Option<String> {
        let (value,): (Option<String>,) =
            sqlx::query_as("SELECT completed_date FROM workout_logs WHERE id = ?")
                .bind(id)
                .fetch_one(pool)
                .await
                .unwrap();
        value
    }

    #[tokio::test]
    async fn test_backfill_fills_missing_dates_only() {
        let (pool, _temp_dir) = setup_pool().await;
        insert_log(&pool, "a", 0, Some("2024-03-01"), None).await;
        insert_log(&pool, "b", 1, None, None).await;
        insert_log(&pool, "c", 2, Some("2024-03-03"), Some("2024-03-04T18:00:00+00:00")).await;

        let summary = backfill_completed_date(&pool, DEFAULT_BATCH_SIZE).await.unwrap();

        assert_eq!(summary.logs_processed, 3);
        assert_eq!(summary.logs_updated, 1);
        assert_eq!(summary.batches, 1);
        assert_eq!(
            completed_date(&pool, "a").await.as_deref(),
            Some("2024-03-01T00:00:00+00:00")
        );
        assert!(completed_date(&pool, "b").await.is_none());
        assert_eq!(
            completed_date(&pool, "c").await.as_deref(),
            Some("2024-03-04T18:00:00+00:00")
        );
    }

    #[tokio::test]
    async fn test_backfill_pages_through_all_logs() {
        let (pool, _temp_dir) = setup_pool().await;
        for day in 0..5 {
            insert_log(&pool, &format!("log{}", day), day, Some("2024-05-10"), None).await;
        }

        let summary = backfill_completed_date(&pool, 2).await.unwrap();

        assert_eq!(summary.logs_processed, 5);
        assert_eq!(summary.logs_updated, 5);
        assert_eq!(summary.batches, 3);
    }

    #[tokio::test]
    async fn test_backfill_is_idempotent() {
        let (pool, _temp_dir) = setup_pool().await;
        insert_log(&pool, "a", 0, Some("2024-03-01"), None).await;

        backfill_completed_date(&pool, DEFAULT_BATCH_SIZE).await.unwrap();
        let second = backfill_completed_date(&pool, DEFAULT_BATCH_SIZE).await.unwrap();

        assert_eq!(second.logs_processed, 1);
        assert_eq!(second.logs_updated, 0);
        assert_eq!(second.batches, 0);
    }

    #[tokio::test]
    async fn test_backfill_empty_table() {
        let (pool, _temp_dir) = setup_pool().await;
        let summary = backfill_completed_date(&pool, DEFAULT_BATCH_SIZE).await.unwrap();
        assert_eq!(summary, BackfillSummary::default());
    }
}
