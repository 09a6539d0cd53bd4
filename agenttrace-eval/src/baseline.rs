use std::collections::HashMap;

use agenttrace_core::domain::ids::TraceId;

use crate::runner::TraceEvaluation;
use crate::statistics::{cohens_d, welch_t_test, WelchTTestResult};

#[derive(Debug, Clone, serde::Serialize)]
pub struct ScoreComparison {
    pub trace_id: TraceId,
    pub evaluator: String,
    pub score_name: String,
    pub current: f64,
    pub baseline: f64,
    pub delta: f64,
    pub percent_change: f64,
    pub regression: bool,
    pub improvement: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BaselineComparisonReport {
    pub comparisons: Vec<ScoreComparison>,
    pub overall_cohens_d: f64,
    pub overall_t_test: Option<WelchTTestResult>,
}

/// `compare_to_baseline(current, baseline, threshold)` (spec.md §4.4
/// "Baseline comparison"). Only `(trace_id, evaluator, score_name)` triples
/// present in both sets are compared; `threshold` is a fraction of the
/// baseline value (e.g. 0.1 = 10%) used to classify regressions/improvements.
pub fn compare_to_baseline(
    current: &[TraceEvaluation],
    baseline: &[TraceEvaluation],
    threshold: f64,
    alpha: f64,
) -> BaselineComparisonReport {
    let baseline_index: HashMap<(TraceId, String, String), f64> = baseline
        .iter()
        .flat_map(|t| {
            t.results.iter().flat_map(move |r| {
                r.scores
                    .iter()
                    .map(move |(name, s)| ((t.trace_id, r.evaluator_name.clone(), name.clone()), s.value))
            })
        })
        .collect();

    let mut comparisons = Vec::new();
    for trace in current {
        for result in &trace.results {
            for (name, score) in &result.scores {
                let key = (trace.trace_id, result.evaluator_name.clone(), name.clone());
                if let Some(&baseline_value) = baseline_index.get(&key) {
                    let delta = score.value - baseline_value;
                    let percent_change = if baseline_value != 0.0 { 100.0 * delta / baseline_value } else { 0.0 };
                    let magnitude = threshold * baseline_value.abs();
                    comparisons.push(ScoreComparison {
                        trace_id: trace.trace_id,
                        evaluator: result.evaluator_name.clone(),
                        score_name: name.clone(),
                        current: score.value,
                        baseline: baseline_value,
                        delta,
                        percent_change,
                        regression: delta <= -magnitude,
                        improvement: delta >= magnitude,
                    });
                }
            }
        }
    }

    let current_overall: Vec<f64> = current.iter().map(|t| t.overall_score).collect();
    let baseline_overall: Vec<f64> = baseline.iter().map(|t| t.overall_score).collect();
    let evaluator_count = current
        .iter()
        .flat_map(|t| t.results.iter().map(|r| r.evaluator_name.clone()))
        .collect::<std::collections::HashSet<_>>()
        .len()
        .max(1);

    BaselineComparisonReport {
        overall_cohens_d: cohens_d(&current_overall, &baseline_overall),
        overall_t_test: welch_t_test(&current_overall, &baseline_overall, alpha, evaluator_count),
        comparisons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::TraceEvaluation;
    use agenttrace_core::domain::eval::{EvalResult, EvalScore};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn eval(trace_id: TraceId, value: f64) -> TraceEvaluation {
        let mut scores = BTreeMap::new();
        scores.insert("quality".to_string(), EvalScore { name: "quality".into(), value, threshold: None });
        TraceEvaluation {
            trace_id,
            results: vec![EvalResult {
                evaluator_name: "judge.quality".into(),
                scores,
                feedback: None,
                metadata: serde_json::Value::Null,
                errors: vec![],
                started_at: Utc::now(),
                finished_at: Utc::now(),
            }],
            overall_score: value,
            passed: true,
            errors: vec![],
        }
    }

    #[test]
    fn regression_detected_when_delta_exceeds_threshold() {
        let trace_id = TraceId::new();
        let current = vec![eval(trace_id, 0.5)];
        let baseline = vec![eval(trace_id, 0.9)];
        let report = compare_to_baseline(&current, &baseline, 0.1, 0.05);
        assert_eq!(report.comparisons.len(), 1);
        assert!(report.comparisons[0].regression);
    }

    #[test]
    fn small_delta_is_neither_regression_nor_improvement() {
        let trace_id = TraceId::new();
        let current = vec![eval(trace_id, 0.91)];
        let baseline = vec![eval(trace_id, 0.9)];
        let report = compare_to_baseline(&current, &baseline, 0.5, 0.05);
        assert!(!report.comparisons[0].regression);
        assert!(!report.comparisons[0].improvement);
    }
}
