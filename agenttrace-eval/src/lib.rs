pub mod baseline;
pub mod judge;
pub mod registry;
pub mod runner;
pub mod statistics;

pub use baseline::{compare_to_baseline, BaselineComparisonReport, ScoreComparison};
pub use judge::{JudgeClient, JudgeConfig, JudgeProvider, JudgeResponse, TokenUsage};
pub use registry::{EvaluatorRegistry, REGISTRY};
pub use runner::{BatchEvaluation, Runner, RunnerConfig, TraceEvaluation};
pub use statistics::{bootstrap_mean_ci, cohens_d, welch_t_test, ConfidenceInterval, WelchTTestResult};
