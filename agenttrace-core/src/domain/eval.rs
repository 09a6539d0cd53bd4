use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single named score produced by an evaluator (spec.md §3 "EvalScore").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalScore {
    pub name: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

impl EvalScore {
    pub fn new(name: impl Into<String>, value: f64, threshold: Option<f64>) -> Self {
        Self {
            name: name.into(),
            value: value.clamp(0.0, 1.0),
            threshold,
        }
    }

    pub fn passed(&self) -> bool {
        self.threshold.map(|t| self.value >= t).unwrap_or(true)
    }
}

/// The full result of one evaluator run against one trace (spec.md §3
/// "EvalResult").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalResult {
    pub evaluator_name: String,
    pub scores: BTreeMap<String, EvalScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl EvalResult {
    pub fn all_passed(&self) -> bool {
        self.errors.is_empty() && self.scores.values().all(EvalScore::passed)
    }

    pub fn mean_score(&self) -> Option<f64> {
        if self.scores.is_empty() {
            return None;
        }
        Some(self.scores.values().map(|s| s.value).sum::<f64>() / self.scores.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_without_threshold_always_passes() {
        let score = EvalScore::new("completeness", 0.1, None);
        assert!(score.passed());
    }

    #[test]
    fn score_clamped_into_unit_interval() {
        let score = EvalScore::new("x", 1.5, None);
        assert_eq!(score.value, 1.0);
    }

    #[test]
    fn all_passed_requires_no_errors_and_all_thresholds_met() {
        let mut scores = BTreeMap::new();
        scores.insert("completeness".to_string(), EvalScore::new("completeness", 0.9, Some(0.7)));
        let result = EvalResult {
            evaluator_name: "completeness".into(),
            scores,
            feedback: None,
            metadata: Value::Null,
            errors: vec![],
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        assert!(result.all_passed());
    }
}
