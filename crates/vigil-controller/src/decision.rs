use std::collections::BTreeMap;

use vigil_core::{ConfigError, Decision, InspectionResult};

/// Per-class confidence thresholds. A defect counts only when its confidence
/// is strictly above the threshold for its category.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceThresholds {
    default: f32,
    per_class: BTreeMap<String, f32>,
}

impl ConfidenceThresholds {
    pub fn new(default: f32, per_class: BTreeMap<String, f32>) -> Result<Self, ConfigError> {
        check_unit_interval("controller.default_confidence_threshold", default)?;
        for (class, threshold) in &per_class {
            check_unit_interval(&format!("controller.class_thresholds.{class}"), *threshold)?;
        }
        Ok(Self { default, per_class })
    }

    #[must_use]
    pub fn threshold_for(&self, category: &str) -> f32 {
        self.per_class.get(category).copied().unwrap_or(self.default)
    }

    #[must_use]
    pub fn is_reject(&self, result: &InspectionResult) -> bool {
        result.classification.defect
            && result.confidence > self.threshold_for(&result.classification.category)
    }
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            default: 0.7,
            per_class: BTreeMap::new(),
        }
    }
}

fn check_unit_interval(key: &str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::invalid(
            key,
            format!("must be between 0.0 and 1.0, got {value}"),
        ));
    }
    Ok(())
}

/// Decision for a record holding a result from every expected client.
pub fn decide_complete<'a>(
    results: impl IntoIterator<Item = &'a InspectionResult>,
    thresholds: &ConfidenceThresholds,
) -> Decision {
    if results.into_iter().any(|r| thresholds.is_reject(r)) {
        Decision::Eject
    } else {
        Decision::Pass
    }
}

/// Fail-safe: missing information at the deadline is an inspection failure.
#[must_use]
pub const fn decide_timeout() -> Decision {
    Decision::Eject
}
