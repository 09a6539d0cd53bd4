use std::sync::Arc;
use std::time::Duration;

use agenttrace_core::domain::{Span, TraceId};
use agenttrace_core::traits::{Sink, SinkOutcome};
use tokio::task::JoinHandle;

use crate::dead_letter::DeadLetterWriter;
use crate::queue::BoundedSpanQueue;
use crate::retry::BackoffPolicy;
use crate::sampler::Sampler;
use crate::shutdown::ShutdownCoordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    Sync,
    Async,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub mode: ExportMode,
    pub workers: usize,
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub batch_interval: Duration,
    pub sample_rate: f64,
    pub backoff: BackoffPolicy,
    pub dead_letter_root: std::path::PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: ExportMode::Async,
            workers: 1,
            queue_capacity: 10_000,
            batch_size: 100,
            batch_interval: Duration::from_secs(5),
            sample_rate: 1.0,
            backoff: BackoffPolicy::default(),
            dead_letter_root: std::path::PathBuf::from("./data"),
        }
    }
}

impl PipelineConfig {
    fn worker_count(&self) -> usize {
        match self.mode {
            ExportMode::Disabled => 0,
            ExportMode::Sync => 1,
            ExportMode::Async => self.workers.max(1),
        }
    }
}

/// Accepts closed spans via a non-blocking `emit`, batches them, and delivers
/// to a sink with at-least-once semantics and graceful shutdown (spec.md
/// §4.2). The worker loop generalizes the accumulate-then-spawn shape of the
/// teacher's `TaskExecutor::execute_batch`.
pub struct ExportPipeline {
    queue: Arc<BoundedSpanQueue>,
    shutdown: Arc<ShutdownCoordinator>,
    sampler: Sampler,
    dead_letter: Arc<DeadLetterWriter>,
    workers: Vec<JoinHandle<()>>,
}

impl ExportPipeline {
    pub fn start(sink: Arc<dyn Sink>, config: PipelineConfig) -> Self {
        let queue = Arc::new(BoundedSpanQueue::new(config.queue_capacity));
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let dead_letter = Arc::new(DeadLetterWriter::new(config.dead_letter_root.clone()));
        let sampler = Sampler::new(config.sample_rate);

        let mut workers = Vec::new();
        for worker_id in 0..config.worker_count() {
            let queue = queue.clone();
            let sink = sink.clone();
            let dead_letter = dead_letter.clone();
            let shutdown = shutdown.clone();
            let config = config.clone();
            workers.push(tokio::spawn(async move {
                worker_loop(worker_id, queue, sink, dead_letter, shutdown, config).await;
            }));
        }

        Self {
            queue,
            shutdown,
            sampler,
            dead_letter,
            workers,
        }
    }

    /// Never raises to the caller (spec.md §4.2). Dropped silently if the
    /// pipeline is disabled, not accepting (mid-shutdown), or the span's
    /// trace was not sampled.
    pub fn emit(&self, span: Span) {
        if !self.shutdown.is_accepting() {
            return;
        }
        if !self.sampler.should_sample(span.trace_id) {
            return;
        }
        let queue = self.queue.clone();
        tokio::spawn(async move {
            queue.push(span).await;
        });
    }

    pub fn trace_sampled(&self, trace_id: TraceId) -> bool {
        self.sampler.should_sample(trace_id)
    }

    pub async fn queue_depth(&self) -> usize {
        self.queue.len().await
    }

    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped_count()
    }

    /// Stops accepting, drains the queue, flushes partial batches, joins
    /// workers. Spans still queued when `timeout` expires go to the
    /// dead-letter file (spec.md §4.2 "Shutdown").
    pub async fn shutdown(self, timeout: Duration) {
        let result = self.shutdown.shutdown(timeout).await;
        for handle in self.workers {
            let _ = handle.await;
        }
        if result.is_err() {
            let remaining = self.queue.drain_all().await;
            if !remaining.is_empty() {
                let _ = self.dead_letter.write_batch("shutdown", &remaining).await;
            }
        }
    }
}

async fn worker_loop(
    _worker_id: usize,
    queue: Arc<BoundedSpanQueue>,
    sink: Arc<dyn Sink>,
    dead_letter: Arc<DeadLetterWriter>,
    shutdown: Arc<ShutdownCoordinator>,
    config: PipelineConfig,
) {
    loop {
        let batch = queue.drain_batch(config.batch_size, config.batch_interval).await;
        if batch.is_empty() {
            if !shutdown.is_accepting() && queue.len().await == 0 {
                return;
            }
            continue;
        }

        export_with_retry(&sink, &dead_letter, &batch, &config.backoff).await;
    }
}

async fn export_with_retry(
    sink: &Arc<dyn Sink>,
    dead_letter: &Arc<DeadLetterWriter>,
    batch: &[Span],
    backoff: &BackoffPolicy,
) {
    let mut attempt = 0u32;
    loop {
        match sink.export(batch).await {
            SinkOutcome::Success => {
                metrics::counter!("export_batch_success").increment(1);
                return;
            }
            SinkOutcome::PermanentFailure(reason) => {
                tracing::warn!(sink = sink.name(), reason, "permanent export failure, dead-lettering");
                let _ = dead_letter.write_batch(sink.name(), batch).await;
                metrics::counter!("export_batch_dead_lettered").increment(1);
                return;
            }
            SinkOutcome::TransientFailure(reason) => {
                if !backoff.should_retry(attempt) {
                    tracing::warn!(sink = sink.name(), reason, "retries exhausted, dead-lettering");
                    let _ = dead_letter.write_batch(sink.name(), batch).await;
                    metrics::counter!("export_batch_dead_lettered").increment(1);
                    return;
                }
                let delay = backoff.delay(attempt);
                tracing::debug!(sink = sink.name(), attempt, ?delay, reason, "retrying export batch");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenttrace_core::domain::SpanKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        calls: Arc<AtomicUsize>,
        outcome: SinkOutcome,
    }

    #[async_trait]
    impl Sink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }
        async fn export(&self, _batch: &[Span]) -> SinkOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    #[tokio::test]
    async fn emit_then_shutdown_delivers_batch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink: Arc<dyn Sink> = Arc::new(CountingSink {
            calls: calls.clone(),
            outcome: SinkOutcome::Success,
        });
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ExportPipeline::start(
            sink,
            PipelineConfig {
                batch_interval: Duration::from_millis(50),
                dead_letter_root: dir.path().to_path_buf(),
                ..Default::default()
            },
        );

        pipeline.emit(agenttrace_core::domain::Span::builder(SpanKind::Agent, "a").build());
        tokio::time::sleep(Duration::from_millis(20)).await;
        pipeline.shutdown(Duration::from_secs(2)).await;

        assert!(calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn permanent_failure_goes_to_dead_letter() {
        let sink: Arc<dyn Sink> = Arc::new(CountingSink {
            calls: Arc::new(AtomicUsize::new(0)),
            outcome: SinkOutcome::PermanentFailure("nope".into()),
        });
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ExportPipeline::start(
            sink,
            PipelineConfig {
                batch_interval: Duration::from_millis(30),
                dead_letter_root: dir.path().to_path_buf(),
                ..Default::default()
            },
        );
        pipeline.emit(agenttrace_core::domain::Span::builder(SpanKind::Agent, "a").build());
        pipeline.shutdown(Duration::from_secs(2)).await;

        let deadletter_dir = dir.path().join("_deadletter");
        let mut entries = tokio::fs::read_dir(&deadletter_dir).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_some());
    }
}
