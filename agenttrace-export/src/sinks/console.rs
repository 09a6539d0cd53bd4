use agenttrace_core::domain::Span;
use agenttrace_core::error::Result;
use agenttrace_core::traits::{Sink, SinkOutcome};
use async_trait::async_trait;

/// Development sink: writes each batch as structured log lines.
pub struct ConsoleSink {
    name: String,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self {
            name: "console".to_string(),
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(&self, batch: &[Span]) -> SinkOutcome {
        for span in batch {
            tracing::info!(
                span_id = %span.span_id,
                trace_id = %span.trace_id,
                kind = ?span.kind,
                name = %span.name,
                status = ?span.status,
                "span exported"
            );
        }
        SinkOutcome::Success
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
