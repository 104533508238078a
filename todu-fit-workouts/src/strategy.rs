//! Maps a change classification and save context to one concrete strategy.
//!
//! Selection never fails: a missing, contradictory or unknown classification
//! degrades to a transactional full-save with the fault named in `reason`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::classify::{ChangeAnalysis, ChangeClassification};
use crate::config::StrategySettings;
use crate::models::{OperationType, SaveContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyType {
    ExerciseOnly,
    MetadataOnly,
    FullSave,
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyType::ExerciseOnly => write!(f, "exercise-only"),
            StrategyType::MetadataOnly => write!(f, "metadata-only"),
            StrategyType::FullSave => write!(f, "full-save"),
        }
    }
}

impl From<StrategyType> for OperationType {
    fn from(strategy_type: StrategyType) -> Self {
        match strategy_type {
            StrategyType::ExerciseOnly => OperationType::ExerciseOnly,
            StrategyType::MetadataOnly => OperationType::MetadataOnly,
            StrategyType::FullSave => OperationType::FullSave,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// The persistence operation chosen for one save attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveStrategy {
    pub strategy_type: StrategyType,
    pub priority: Priority,
    /// Advisory; the caller's scheduler owns the actual timer.
    pub recommended_delay_ms: Option<u64>,
    pub use_transaction: bool,
    pub validate_cache: bool,
    pub reason: String,
}

impl SaveStrategy {
    /// The safe default used whenever selection cannot trust its input.
    pub fn full_save(reason: impl Into<String>) -> Self {
        Self {
            strategy_type: StrategyType::FullSave,
            priority: Priority::High,
            recommended_delay_ms: None,
            use_transaction: true,
            validate_cache: true,
            reason: reason.into(),
        }
    }

    fn base(strategy_type: StrategyType, debounce_ms: u64, reason: String) -> Self {
        match strategy_type {
            StrategyType::ExerciseOnly => Self {
                strategy_type,
                priority: Priority::Normal,
                recommended_delay_ms: Some(debounce_ms),
                use_transaction: false,
                validate_cache: false,
                reason,
            },
            StrategyType::MetadataOnly => Self {
                strategy_type,
                priority: Priority::High,
                recommended_delay_ms: None,
                use_transaction: false,
                validate_cache: false,
                reason,
            },
            StrategyType::FullSave => Self {
                strategy_type,
                priority: Priority::High,
                recommended_delay_ms: None,
                use_transaction: true,
                validate_cache: false,
                reason,
            },
        }
    }

    /// Switches to full-save with the full-save base's priority and timing.
    fn escalate_to_full_save(&mut self) {
        self.strategy_type = StrategyType::FullSave;
        self.priority = Priority::High;
        self.recommended_delay_ms = None;
        self.use_transaction = true;
    }

    fn note(&mut self, reason: impl AsRef<str>) {
        self.reason.push_str("; ");
        self.reason.push_str(reason.as_ref());
    }
}

/// Selects the strategy for `analysis` using the current time.
pub fn select_strategy(
    analysis: Option<&ChangeAnalysis>,
    context: &SaveContext,
    settings: &StrategySettings,
) -> SaveStrategy {
    select_strategy_at(analysis, context, settings, Utc::now())
}

/// Selects the strategy for `analysis` as of `now`.
pub fn select_strategy_at(
    analysis: Option<&ChangeAnalysis>,
    context: &SaveContext,
    settings: &StrategySettings,
    now: DateTime<Utc>,
) -> SaveStrategy {
    let Some(analysis) = analysis else {
        return SaveStrategy::full_save("Strategy selection failed: no change analysis");
    };

    if let Err(problem) = analysis.check_consistency() {
        return SaveStrategy::full_save(format!("Strategy selection failed: {}", problem));
    }

    match base_type(analysis.save_strategy) {
        Some(strategy_type) => {
            let reason = format!("{} ({})", analysis.save_strategy, analysis.summary);
            let base = SaveStrategy::base(strategy_type, context.preferences.debounce_ms, reason);
            apply_overrides(base, context, settings, now)
        }
        None => SaveStrategy::full_save(format!(
            "Strategy selection failed: no base strategy for classification {}",
            analysis.save_strategy
        )),
    }
}

/// Selects a strategy from a string-tagged classification, as received from
/// callers that hand over a serialized label.
pub fn select_strategy_for_tag(
    tag: &str,
    context: &SaveContext,
    settings: &StrategySettings,
) -> SaveStrategy {
    match tag.parse::<ChangeClassification>() {
        Ok(classification) => match base_type(classification) {
            Some(strategy_type) => {
                let base = SaveStrategy::base(
                    strategy_type,
                    context.preferences.debounce_ms,
                    classification.to_string(),
                );
                apply_overrides(base, context, settings, Utc::now())
            }
            None => SaveStrategy::full_save(format!(
                "Strategy selection failed: no base strategy for classification {}",
                classification
            )),
        },
        Err(unknown) => SaveStrategy::full_save(unknown),
    }
}

fn base_type(classification: ChangeClassification) -> Option<StrategyType> {
    match classification {
        ChangeClassification::None => None,
        ChangeClassification::ExerciseOnly => Some(StrategyType::ExerciseOnly),
        ChangeClassification::MetadataOnly => Some(StrategyType::MetadataOnly),
        ChangeClassification::FullSave => Some(StrategyType::FullSave),
    }
}

fn apply_overrides(
    mut strategy: SaveStrategy,
    context: &SaveContext,
    settings: &StrategySettings,
    now: DateTime<Utc>,
) -> SaveStrategy {
    if context.preferences.force_full_save && strategy.strategy_type != StrategyType::FullSave {
        strategy.escalate_to_full_save();
        strategy.note("full-save forced by request");
    }

    if context.is_finished {
        strategy.priority = Priority::High;
        strategy.recommended_delay_ms = None;
        strategy.note("workout finished, saving immediately");
    }

    if !context.has_existing_log && strategy.strategy_type == StrategyType::ExerciseOnly {
        strategy.escalate_to_full_save();
        strategy.note("no existing log, creating it with its exercises");
    }

    if context.lookup_failed && strategy.strategy_type == StrategyType::MetadataOnly {
        strategy.escalate_to_full_save();
        strategy.note("log lookup failed, full-save resolves the log");
    }

    if !context.cache_valid {
        strategy.validate_cache = true;
        strategy.note("cache invalid");
    }

    if let (Some(last_save), Some(delay)) =
        (context.last_save_time, strategy.recommended_delay_ms)
    {
        let since_last = (now - last_save).num_milliseconds();
        if since_last >= 0 && (since_last as u64) < delay / 2 {
            let extended = ((delay as f64) * settings.rapid_edit_factor) as u64;
            let extended = extended.min(settings.max_debounce_ms.max(delay));
            if extended > delay {
                strategy.recommended_delay_ms = Some(extended);
                strategy.note(format!(
                    "rapid edits, delay extended to {}ms",
                    extended
                ));
            }
        }
    }

    strategy
}
