use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::{ContinuousCDF, StudentsT};
use statrs::statistics::Statistics;

/// A [2.5, 97.5] percentile confidence interval over a bootstrap resample
/// distribution (spec.md §4.4 "Bootstrap confidence intervals").
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

const BOOTSTRAP_RESAMPLES: usize = 10_000;
const BOOTSTRAP_SEED: u64 = 42;

/// Computes a 95% bootstrap CI for the mean of `scores`. Returns `None` for
/// `n < 2`, per spec.md §4.4 ("For n<2, CI is undefined"). The seed is fixed
/// so repeated calls over the same sample are reproducible.
pub fn bootstrap_mean_ci(scores: &[f64]) -> Option<ConfidenceInterval> {
    if scores.len() < 2 {
        return None;
    }
    let mut rng = StdRng::seed_from_u64(BOOTSTRAP_SEED);
    let mut means = Vec::with_capacity(BOOTSTRAP_RESAMPLES);
    for _ in 0..BOOTSTRAP_RESAMPLES {
        let resampled: f64 = (0..scores.len())
            .map(|_| scores[rng.gen_range(0..scores.len())])
            .sum::<f64>()
            / scores.len() as f64;
        means.push(resampled);
    }
    means.sort_by(|a, b| a.partial_cmp(b).unwrap());
    Some(ConfidenceInterval {
        lower: percentile(&means, 2.5),
        upper: percentile(&means, 97.5),
    })
}

fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let idx = ((pct / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Standardized mean difference between two samples (spec.md §4.4 "report
/// Cohen's d over paired overall_scores").
pub fn cohens_d(sample1: &[f64], sample2: &[f64]) -> f64 {
    if sample1.len() < 2 || sample2.len() < 2 {
        return 0.0;
    }
    let (mean1, mean2) = (sample1.mean(), sample2.mean());
    let (var1, var2) = (sample1.variance(), sample2.variance());
    let (n1, n2) = (sample1.len() as f64, sample2.len() as f64);
    let pooled_std = (((n1 - 1.0) * var1 + (n2 - 1.0) * var2) / (n1 + n2 - 2.0)).sqrt();
    if pooled_std == 0.0 {
        return 0.0;
    }
    (mean1 - mean2) / pooled_std
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct WelchTTestResult {
    pub statistic: f64,
    pub p_value: f64,
    /// True when `p_value` is below the Bonferroni-corrected `alpha / m`.
    pub significant: bool,
}

/// Two-sided Welch's t-test at `alpha`, corrected for `comparisons`
/// simultaneous tests via Bonferroni (spec.md §4.4 "when testing multiple
/// evaluators apply Bonferroni correction α' = α/m"). Unlike Student's
/// t-test, Welch's does not assume equal variances, which evaluator score
/// distributions rarely satisfy.
pub fn welch_t_test(sample1: &[f64], sample2: &[f64], alpha: f64, comparisons: usize) -> Option<WelchTTestResult> {
    if sample1.len() < 2 || sample2.len() < 2 {
        return None;
    }
    let (mean1, mean2) = (sample1.mean(), sample2.mean());
    let (var1, var2) = (sample1.variance(), sample2.variance());
    let (n1, n2) = (sample1.len() as f64, sample2.len() as f64);

    let se = (var1 / n1 + var2 / n2).sqrt();
    if se == 0.0 {
        return Some(WelchTTestResult { statistic: 0.0, p_value: 1.0, significant: false });
    }
    let statistic = (mean1 - mean2) / se;

    let df_num = (var1 / n1 + var2 / n2).powi(2);
    let df_den = (var1 / n1).powi(2) / (n1 - 1.0) + (var2 / n2).powi(2) / (n2 - 1.0);
    let df = if df_den > 0.0 { df_num / df_den } else { 1.0 };

    let dist = StudentsT::new(0.0, 1.0, df.max(1.0)).ok()?;
    let p_value = 2.0 * (1.0 - dist.cdf(statistic.abs()));

    let corrected_alpha = if comparisons > 0 { alpha / comparisons as f64 } else { alpha };
    Some(WelchTTestResult { statistic, p_value, significant: p_value < corrected_alpha })
}
