//! Save orchestration.
//!
//! `execute_save` runs one save through
//! validate → build context → detect changes → select strategy → execute.
//! A persistence failure during execution is retried exactly once as a
//! full-save; validation failures are never retried.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::classify::{classify, ChangeAnalysis, ChangeClassification};
use crate::config::EngineConfig;
use crate::diff::{compare_exercises, rank_order_indexes, DiffOptions};
use crate::error::{PersistenceError, SaveError};
use crate::metadata::diff_metadata;
use crate::metrics::{AttemptSample, SaveMetrics, SaveOutcome};
use crate::models::{
    ExerciseEntry, LogId, LogKey, OperationType, SaveContext, SavePerformance, SavePreferences,
    SaveRequest, SaveResult, SaveType, WorkoutLog, WorkoutMetadata, WorkoutSnapshot, WriteReport,
};
use crate::normalize::normalize_exercises;
use crate::store::{AssumeValid, CacheProbe, WorkoutStore};
use crate::strategy::{select_strategy, StrategyType};

/// Everything the execution step writes, computed once per save.
struct SavePlan {
    analysis: ChangeAnalysis,
    metadata: WorkoutMetadata,
    entries: Vec<ExerciseEntry>,
}

pub struct SaveEngine {
    store: Arc<dyn WorkoutStore>,
    cache: Arc<dyn CacheProbe>,
    config: EngineConfig,
    metrics: Arc<SaveMetrics>,
}

impl SaveEngine {
    pub fn new(store: Arc<dyn WorkoutStore>, config: EngineConfig) -> Self {
        let metrics = Arc::new(SaveMetrics::new(config.metrics_samples));
        Self {
            store,
            cache: Arc::new(AssumeValid),
            config,
            metrics,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheProbe>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<SaveMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Runs validation, context and change detection without writing anything.
    pub async fn detect_changes(&self, request: &SaveRequest) -> Result<ChangeAnalysis, SaveError> {
        request.validate()?;
        let key = request.key();
        let preferences = self.preferences(request);
        let (_, stored) = self.build_context(request, &key, preferences.clone()).await;
        let plan = self.plan(request, stored.as_ref(), &preferences)?;
        Ok(plan.analysis)
    }

    pub async fn execute_save(&self, request: &SaveRequest) -> Result<SaveResult, SaveError> {
        let started = Instant::now();

        request.validate()?;
        let key = request.key();
        let preferences = self.preferences(request);
        let (context, stored) = self.build_context(request, &key, preferences.clone()).await;
        let plan = self.plan(request, stored.as_ref(), &preferences)?;

        if plan.analysis.save_strategy == ChangeClassification::None {
            tracing::debug!("No changes for {}, skipping save", key);
            self.metrics.record_skipped();
            return Ok(SaveResult {
                success: true,
                log_id: context.log_id.clone(),
                operation_type: OperationType::NoOp,
                affected_collections: Vec::new(),
                cache_updated: false,
                strategy_reason: plan.analysis.summary.clone(),
                performance: SavePerformance {
                    duration_ms: started.elapsed().as_millis() as u64,
                    ..Default::default()
                },
            });
        }

        let strategy = select_strategy(Some(&plan.analysis), &context, &self.config.strategy);
        tracing::debug!(
            "Selected {} for {} (priority {}, delay {:?}, validate cache {}): {}",
            strategy.strategy_type,
            key,
            strategy.priority,
            strategy.recommended_delay_ms,
            strategy.validate_cache,
            strategy.reason
        );

        let mut attempts = Vec::with_capacity(2);
        let attempt_started = Instant::now();
        let primary = self
            .run_strategy(strategy.strategy_type, &key, context.log_id.as_ref(), &plan)
            .await;
        attempts.push(AttemptSample {
            strategy: strategy.strategy_type,
            success: primary.is_ok(),
            duration: attempt_started.elapsed(),
        });

        let original = match primary {
            Ok((log_id, report)) => {
                let operation: OperationType = strategy.strategy_type.into();
                self.metrics.record(&SaveOutcome {
                    attempts,
                    final_operation: Some(operation),
                    write_count: report.rows_written,
                });
                tracing::info!(
                    "Saved {} as {} ({} writes)",
                    key,
                    operation,
                    report.rows_written
                );
                return Ok(finish(
                    log_id,
                    operation,
                    report,
                    strategy.reason,
                    None,
                    started,
                ));
            }
            Err(SaveError::Persistence(err)) => err,
            Err(other) => {
                self.metrics.record(&SaveOutcome {
                    attempts,
                    final_operation: None,
                    write_count: 0,
                });
                return Err(other);
            }
        };

        tracing::warn!(
            "{} save for {} failed, falling back to full-save: {}",
            strategy.strategy_type,
            key,
            original
        );

        let attempt_started = Instant::now();
        let fallback = self.full_save(&key, context.log_id.as_ref(), &plan).await;
        attempts.push(AttemptSample {
            strategy: StrategyType::FullSave,
            success: fallback.is_ok(),
            duration: attempt_started.elapsed(),
        });

        match fallback {
            Ok((log_id, report)) => {
                self.metrics.record(&SaveOutcome {
                    attempts,
                    final_operation: Some(OperationType::FullSave),
                    write_count: report.rows_written,
                });
                tracing::info!(
                    "Saved {} as full-save fallback ({} writes)",
                    key,
                    report.rows_written
                );
                let reason = format!("{}; fallback to full-save", strategy.reason);
                Ok(finish(
                    log_id,
                    OperationType::FullSave,
                    report,
                    reason,
                    Some(original.to_string()),
                    started,
                ))
            }
            Err(source) => {
                self.metrics.record(&SaveOutcome {
                    attempts,
                    final_operation: None,
                    write_count: 0,
                });
                tracing::warn!("Full-save fallback for {} failed: {}", key, source);
                Err(SaveError::FallbackFailed {
                    original: original.to_string(),
                    source,
                })
            }
        }
    }

    fn preferences(&self, request: &SaveRequest) -> SavePreferences {
        let options = request.options.clone().unwrap_or_default();
        SavePreferences {
            tolerance: options.tolerance.unwrap_or(self.config.tolerance),
            track_order_changes: options
                .track_order_changes
                .unwrap_or(self.config.track_order_changes),
            debounce_ms: options
                .debounce_ms
                .unwrap_or(self.config.strategy.default_debounce_ms),
            force_full_save: options.force_full_save,
        }
    }

    async fn build_context(
        &self,
        request: &SaveRequest,
        key: &LogKey,
        preferences: SavePreferences,
    ) -> (SaveContext, Option<WorkoutLog>) {
        let (stored, lookup_ok) = match self.store.find_log(key).await {
            Ok(log) => (log, true),
            Err(err) => {
                tracing::warn!("Could not load workout log for {}: {}", key, err);
                (None, false)
            }
        };

        let context = SaveContext {
            has_existing_log: stored.is_some(),
            log_id: stored.as_ref().map(|log| log.id.clone()),
            is_finished: stored.as_ref().is_some_and(|log| log.metadata.is_finished)
                || request.save_type == SaveType::Completion,
            last_save_time: stored.as_ref().map(|log| log.updated_at),
            cache_valid: lookup_ok && self.cache.is_valid(key),
            lookup_failed: !lookup_ok,
            preferences,
        };

        (context, stored)
    }

    fn plan(
        &self,
        request: &SaveRequest,
        stored: Option<&WorkoutLog>,
        preferences: &SavePreferences,
    ) -> Result<SavePlan, SaveError> {
        let baseline = match (&request.previous_data, stored) {
            (Some(previous), _) => previous.clone(),
            (None, Some(log)) => log.snapshot(),
            (None, None) => WorkoutSnapshot::default(),
        };

        let options = DiffOptions {
            tolerance: preferences.tolerance,
            track_order_changes: preferences.track_order_changes,
            unknown_id_policy: self.config.unknown_id_policy,
        };
        let comparison = compare_exercises(
            Some(baseline.exercises.as_slice()),
            Some(request.current_data.exercises.as_slice()),
            &options,
        )?;

        let metadata = effective_metadata(request, &baseline.metadata);
        let metadata_changes = diff_metadata(Some(&baseline.metadata), &metadata);
        let analysis = classify(
            &comparison.changes,
            &metadata_changes,
            &self.config.structural_policy,
        );

        // Rows a full rewrite stores; ids the baseline never had are dropped.
        let known: HashSet<&str> = baseline
            .exercises
            .iter()
            .filter_map(|e| e.id.as_deref())
            .collect();
        let mut entries: Vec<ExerciseEntry> = normalize_exercises(&request.current_data.exercises)?
            .into_iter()
            .map(|mut entry| {
                if entry.id.as_deref().is_some_and(|id| !known.contains(id)) {
                    entry.id = None;
                }
                entry
            })
            .collect();
        if comparison.changes.order_changed {
            rank_order_indexes(&mut entries);
        }

        Ok(SavePlan {
            analysis,
            metadata,
            entries,
        })
    }

    async fn run_strategy(
        &self,
        strategy_type: StrategyType,
        key: &LogKey,
        log_id: Option<&LogId>,
        plan: &SavePlan,
    ) -> Result<(LogId, WriteReport), SaveError> {
        match strategy_type {
            StrategyType::ExerciseOnly => {
                let log_id = self.resolve_log_id(key, log_id).await?;
                let report = self
                    .store
                    .write_exercises_only(&log_id, &plan.analysis.exercise_changes)
                    .await?;
                Ok((log_id, report))
            }
            StrategyType::MetadataOnly => {
                let log_id = log_id
                    .cloned()
                    .ok_or_else(|| SaveError::MissingLog(key.clone()))?;
                let report = self
                    .store
                    .write_metadata_only(&log_id, &plan.metadata)
                    .await?;
                Ok((log_id, report))
            }
            StrategyType::FullSave => Ok(self.full_save(key, log_id, plan).await?),
        }
    }

    async fn full_save(
        &self,
        key: &LogKey,
        log_id: Option<&LogId>,
        plan: &SavePlan,
    ) -> Result<(LogId, WriteReport), PersistenceError> {
        let log_id = self.resolve_log_id(key, log_id).await?;
        let report = self
            .store
            .write_full(&log_id, &plan.metadata, &plan.entries)
            .await?;
        Ok((log_id, report))
    }

    async fn resolve_log_id(
        &self,
        key: &LogKey,
        log_id: Option<&LogId>,
    ) -> Result<LogId, PersistenceError> {
        match log_id {
            Some(id) => Ok(id.clone()),
            None => self.store.ensure_log_exists(key).await,
        }
    }
}

/// The metadata this save should persist.
///
/// A completion save marks the workout finished and keeps the first
/// completion timestamp it can find.
fn effective_metadata(request: &SaveRequest, baseline: &WorkoutMetadata) -> WorkoutMetadata {
    let mut metadata = request.current_data.metadata.clone();
    if request.save_type == SaveType::Completion {
        metadata.is_finished = true;
        if metadata.completed_date.is_none() {
            metadata.completed_date = Some(baseline.completed_date.unwrap_or_else(Utc::now));
        }
    }
    metadata
}

fn finish(
    log_id: LogId,
    operation_type: OperationType,
    report: WriteReport,
    strategy_reason: String,
    original_error: Option<String>,
    started: Instant,
) -> SaveResult {
    SaveResult {
        success: true,
        log_id: Some(log_id),
        operation_type,
        cache_updated: report.rows_written > 0,
        affected_collections: report.collections,
        strategy_reason,
        performance: SavePerformance {
            duration_ms: started.elapsed().as_millis() as u64,
            write_count: report.rows_written,
            fallback_used: original_error.is_some(),
            original_error,
        },
    }
}
