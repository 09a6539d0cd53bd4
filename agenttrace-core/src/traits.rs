use async_trait::async_trait;

use crate::domain::span::Span;
use crate::error::Result;

/// A destination for exported spans (console, file, HTTP, audit, composite).
///
/// Kept narrow per the design notes in spec.md §9: sinks only need to accept
/// a batch and report an outcome, never the full storage surface.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    async fn export(&self, batch: &[Span]) -> SinkOutcome;

    /// Called during shutdown after the last batch has been handed to `export`.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOutcome {
    Success,
    TransientFailure(String),
    PermanentFailure(String),
}

/// A pluggable quality dimension scorer, registered under `namespace.name`.
#[async_trait]
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    async fn evaluate(
        &self,
        trace: &crate::domain::trace::Trace,
    ) -> Result<crate::domain::eval::EvalResult>;
}

/// Generic pub/sub event publisher, used by the audit live-stream bus and the
/// orchestrator's progress channel.
#[async_trait]
pub trait EventPublisher<E: Send + Sync + 'static>: Send + Sync {
    async fn publish(&self, event: E) -> Result<()>;
}
