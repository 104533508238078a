//! Save metrics owned by one engine instance.
//!
//! Counters and bounded duration samples live behind a mutex so a shared
//! engine can be driven from several tasks.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::config::DEFAULT_METRICS_SAMPLES;
use crate::models::OperationType;
use crate::strategy::StrategyType;

/// One execution attempt of a strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttemptSample {
    pub strategy: StrategyType,
    pub success: bool,
    pub duration: Duration,
}

/// Everything recorded for one `execute_save` call that reached execution.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    /// Primary attempt first, then the fallback attempt if one ran.
    pub attempts: Vec<AttemptSample>,
    /// `None` when the save failed for good.
    pub final_operation: Option<OperationType>,
    pub write_count: usize,
}

impl SaveOutcome {
    pub fn fallback_used(&self) -> bool {
        self.attempts.len() > 1
    }
}

#[derive(Debug, Default)]
struct StrategyStats {
    attempts: u64,
    successes: u64,
    failures: u64,
    fallbacks_triggered: u64,
    durations_ms: VecDeque<u64>,
}

#[derive(Debug, Default)]
struct MetricsState {
    strategies: HashMap<StrategyType, StrategyStats>,
    total_saves: u64,
    skipped_saves: u64,
    failed_saves: u64,
    optimized_saves: u64,
    full_saves: u64,
    fallback_saves: u64,
    total_writes: u64,
}

#[derive(Debug)]
pub struct SaveMetrics {
    max_samples: usize,
    state: Mutex<MetricsState>,
}

impl Default for SaveMetrics {
    fn default() -> Self {
        Self::new(DEFAULT_METRICS_SAMPLES)
    }
}

impl SaveMetrics {
    /// Creates a collector keeping at most `max_samples` durations per strategy.
    pub fn new(max_samples: usize) -> Self {
        Self {
            max_samples: max_samples.max(1),
            state: Mutex::new(MetricsState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, outcome: &SaveOutcome) {
        let mut state = self.lock();
        state.total_saves += 1;

        let last = outcome.attempts.len().saturating_sub(1);
        for (i, attempt) in outcome.attempts.iter().enumerate() {
            let stats = state.strategies.entry(attempt.strategy).or_default();
            stats.attempts += 1;
            if attempt.success {
                stats.successes += 1;
            } else {
                stats.failures += 1;
                if i < last {
                    stats.fallbacks_triggered += 1;
                }
            }
            stats.durations_ms.push_back(attempt.duration.as_millis() as u64);
            while stats.durations_ms.len() > self.max_samples {
                stats.durations_ms.pop_front();
            }
        }

        if outcome.fallback_used() {
            state.fallback_saves += 1;
        }

        match outcome.final_operation {
            Some(operation) if operation.is_optimized() => state.optimized_saves += 1,
            Some(OperationType::FullSave) => state.full_saves += 1,
            Some(_) => {}
            None => state.failed_saves += 1,
        }
        state.total_writes += outcome.write_count as u64;
    }

    /// Counts a save that found nothing to write.
    pub fn record_skipped(&self) {
        let mut state = self.lock();
        state.total_saves += 1;
        state.skipped_saves += 1;
    }

    pub fn reset(&self) {
        *self.lock() = MetricsState::default();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.lock();

        let strategies = state
            .strategies
            .iter()
            .map(|(strategy, stats)| (strategy.to_string(), StrategySnapshot::from(stats)))
            .collect();

        let written = state.optimized_saves + state.full_saves;
        let optimization_rate = if written == 0 {
            0.0
        } else {
            state.optimized_saves as f64 / written as f64
        };

        MetricsSnapshot {
            strategies,
            total_saves: state.total_saves,
            skipped_saves: state.skipped_saves,
            failed_saves: state.failed_saves,
            optimized_saves: state.optimized_saves,
            full_saves: state.full_saves,
            fallback_saves: state.fallback_saves,
            total_writes: state.total_writes,
            optimization_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategySnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub fallbacks_triggered: u64,
    pub error_rate: f64,
    pub average_duration_ms: f64,
    pub max_duration_ms: u64,
    pub samples: usize,
}

impl From<&StrategyStats> for StrategySnapshot {
    fn from(stats: &StrategyStats) -> Self {
        let samples = stats.durations_ms.len();
        let average_duration_ms = if samples == 0 {
            0.0
        } else {
            stats.durations_ms.iter().sum::<u64>() as f64 / samples as f64
        };
        let error_rate = if stats.attempts == 0 {
            0.0
        } else {
            stats.failures as f64 / stats.attempts as f64
        };

        Self {
            attempts: stats.attempts,
            successes: stats.successes,
            failures: stats.failures,
            fallbacks_triggered: stats.fallbacks_triggered,
            error_rate,
            average_duration_ms,
            max_duration_ms: stats.durations_ms.iter().copied().max().unwrap_or(0),
            samples,
        }
    }
}

/// Point-in-time copy of the collected metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Keyed by strategy name (`exercise-only`, `metadata-only`, `full-save`).
    pub strategies: BTreeMap<String, StrategySnapshot>,
    pub total_saves: u64,
    pub skipped_saves: u64,
    pub failed_saves: u64,
    pub optimized_saves: u64,
    pub full_saves: u64,
    pub fallback_saves: u64,
    pub total_writes: u64,
    /// Share of writing saves that avoided a full rewrite.
    pub optimization_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn attempt(strategy: StrategyType, success: bool, ms: u64) -> AttemptSample {
        AttemptSample {
            strategy,
            success,
            duration: Duration::from_millis(ms),
        }
    }

    fn success(strategy: StrategyType, ms: u64, writes: usize) -> SaveOutcome {
        SaveOutcome {
            attempts: vec![attempt(strategy, true, ms)],
            final_operation: Some(strategy.into()),
            write_count: writes,
        }
    }

    #[test]
    fn test_records_successful_saves() {
        let metrics = SaveMetrics::default();
        metrics.record(&success(StrategyType::ExerciseOnly, 10, 2));
        metrics.record(&success(StrategyType::ExerciseOnly, 30, 1));
        metrics.record(&success(StrategyType::FullSave, 50, 5));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_saves, 3);
        assert_eq!(snapshot.optimized_saves, 2);
        assert_eq!(snapshot.full_saves, 1);
        assert_eq!(snapshot.total_writes, 8);

        let exercise = &snapshot.strategies["exercise-only"];
        assert_eq!(exercise.attempts, 2);
        assert_eq!(exercise.successes, 2);
        assert_eq!(exercise.average_duration_ms, 20.0);
        assert_eq!(exercise.max_duration_ms, 30);
        assert_eq!(exercise.error_rate, 0.0);
    }

    #[test]
    fn test_records_fallback() {
        let metrics = SaveMetrics::default();
        metrics.record(&SaveOutcome {
            attempts: vec![
                attempt(StrategyType::ExerciseOnly, false, 5),
                attempt(StrategyType::FullSave, true, 15),
            ],
            final_operation: Some(OperationType::FullSave),
            write_count: 4,
        });

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.fallback_saves, 1);
        assert_eq!(snapshot.full_saves, 1);
        assert_eq!(snapshot.optimized_saves, 0);

        let exercise = &snapshot.strategies["exercise-only"];
        assert_eq!(exercise.failures, 1);
        assert_eq!(exercise.fallbacks_triggered, 1);
        assert_eq!(exercise.error_rate, 1.0);
        assert_eq!(snapshot.strategies["full-save"].successes, 1);
    }

    #[test]
    fn test_records_final_failure() {
        let metrics = SaveMetrics::default();
        metrics.record(&SaveOutcome {
            attempts: vec![
                attempt(StrategyType::FullSave, false, 5),
                attempt(StrategyType::FullSave, false, 5),
            ],
            final_operation: None,
            write_count: 0,
        });

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.failed_saves, 1);
        let full = &snapshot.strategies["full-save"];
        assert_eq!(full.attempts, 2);
        assert_eq!(full.failures, 2);
        assert_eq!(full.fallbacks_triggered, 1);
    }

    #[test]
    fn test_samples_are_bounded() {
        let metrics = SaveMetrics::new(100);
        for i in 0..150 {
            metrics.record(&success(StrategyType::MetadataOnly, i, 1));
        }

        let snapshot = metrics.snapshot();
        let metadata = &snapshot.strategies["metadata-only"];
        assert_eq!(metadata.samples, 100);
        assert_eq!(metadata.attempts, 150);
        assert_eq!(metadata.max_duration_ms, 149);
    }

    #[test]
    fn test_skipped_and_optimization_rate() {
        let metrics = SaveMetrics::default();
        metrics.record_skipped();
        metrics.record(&success(StrategyType::ExerciseOnly, 1, 1));
        metrics.record(&success(StrategyType::FullSave, 1, 3));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_saves, 3);
        assert_eq!(snapshot.skipped_saves, 1);
        assert_eq!(snapshot.optimization_rate, 0.5);
    }

    #[test]
    fn test_reset() {
        let metrics = SaveMetrics::default();
        metrics.record(&success(StrategyType::ExerciseOnly, 1, 1));
        metrics.reset();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_saves, 0);
        assert!(snapshot.strategies.is_empty());
    }

    #[test]
    fn test_concurrent_recording() {
        let metrics = Arc::new(SaveMetrics::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        metrics.record(&success(StrategyType::ExerciseOnly, 1, 1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.snapshot().total_saves, 100);
    }
}
