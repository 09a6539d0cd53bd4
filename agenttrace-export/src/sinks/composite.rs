use agenttrace_core::domain::Span;
use agenttrace_core::error::Result;
use agenttrace_core::traits::{Sink, SinkOutcome};
use async_trait::async_trait;

/// Fans a batch out to multiple sinks with independent retry state (spec.md
/// §4.2). Mirrors the teacher's `CompositeAuditWriter`: succeeds unless every
/// underlying sink fails, but the worst outcome among failures is reported so
/// the caller's retry/dead-letter policy still engages when needed.
pub struct CompositeSink {
    name: String,
    sinks: Vec<Box<dyn Sink>>,
}

impl CompositeSink {
    pub fn new(sinks: Vec<Box<dyn Sink>>) -> Self {
        Self {
            name: "composite".to_string(),
            sinks,
        }
    }
}

#[async_trait]
impl Sink for CompositeSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(&self, batch: &[Span]) -> SinkOutcome {
        let mut outcomes = Vec::with_capacity(self.sinks.len());
        for sink in &self.sinks {
            outcomes.push((sink.name().to_string(), sink.export(batch).await));
        }

        if outcomes.iter().all(|(_, o)| matches!(o, SinkOutcome::Success)) {
            return SinkOutcome::Success;
        }
        if outcomes.iter().all(|(_, o)| !matches!(o, SinkOutcome::Success)) {
            let permanent = outcomes
                .iter()
                .find(|(_, o)| matches!(o, SinkOutcome::PermanentFailure(_)));
            return match permanent {
                Some((name, SinkOutcome::PermanentFailure(msg))) => {
                    SinkOutcome::PermanentFailure(format!("{name}: {msg}"))
                }
                _ => {
                    let (name, msg) = outcomes
                        .iter()
                        .find_map(|(n, o)| match o {
                            SinkOutcome::TransientFailure(m) => Some((n.clone(), m.clone())),
                            _ => None,
                        })
                        .unwrap_or_else(|| ("unknown".to_string(), "all sinks failed".to_string()));
                    SinkOutcome::TransientFailure(format!("{name}: {msg}"))
                }
            };
        }
        // Mixed: at least one sink succeeded. At-least-once is satisfied, so
        // report success but note the partial failure via a metric.
        metrics::counter!("export_composite_partial_failure").increment(1);
        SinkOutcome::Success
    }

    async fn flush(&self) -> Result<()> {
        for sink in &self.sinks {
            sink.flush().await?;
        }
        Ok(())
    }
}
