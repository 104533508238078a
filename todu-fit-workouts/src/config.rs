//! Tunables for the save engine.
//!
//! Deserializes from the `save_engine:` section of the CLI config file; every
//! field falls back to its default when absent.

use serde::{Deserialize, Serialize};

use crate::classify::StructuralPolicy;
use crate::diff::UnknownIdPolicy;

/// Default numeric tolerance for weight/rep comparison.
pub const DEFAULT_TOLERANCE: f64 = 0.001;
/// Default recommended delay for exercise-only saves.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1500;
/// Ceiling for the rapid-edit delay extension.
pub const DEFAULT_MAX_DEBOUNCE_MS: u64 = 5000;
/// Largest `sets` value an exercise entry may declare.
pub const MAX_SETS: u32 = 100;
/// Rolling duration samples kept per strategy.
pub const DEFAULT_METRICS_SAMPLES: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tolerance: f64,
    pub track_order_changes: bool,
    pub unknown_id_policy: UnknownIdPolicy,
    pub structural_policy: StructuralPolicy,
    pub strategy: StrategySettings,
    pub metrics_samples: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            track_order_changes: true,
            unknown_id_policy: UnknownIdPolicy::default(),
            structural_policy: StructuralPolicy::default(),
            strategy: StrategySettings::default(),
            metrics_samples: DEFAULT_METRICS_SAMPLES,
        }
    }
}

/// Delay policy used by the strategy selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategySettings {
    pub default_debounce_ms: u64,
    pub max_debounce_ms: u64,
    /// Multiplier applied when saves arrive faster than half the delay window.
    pub rapid_edit_factor: f64,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            default_debounce_ms: DEFAULT_DEBOUNCE_MS,
            max_debounce_ms: DEFAULT_MAX_DEBOUNCE_MS,
            rapid_edit_factor: 1.5,
        }
    }
}
