use std::path::PathBuf;
use std::sync::Arc;

use agenttrace_core::domain::Span;
use agenttrace_core::error::{CoreError, Result};
use agenttrace_core::traits::{Sink, SinkOutcome};
use async_trait::async_trait;
use chrono::Utc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// JSON-lines sink, one file per UTC day, modeled on the teacher's
/// `FileAuditWriter` rotation idiom (spec.md §4.2 "File (JSON lines,
/// partitioned by date)").
pub struct FileSink {
    name: String,
    dir: PathBuf,
    current: Arc<Mutex<Option<(String, File)>>>,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            name: "file".to_string(),
            dir: dir.into(),
            current: Arc::new(Mutex::new(None)),
        }
    }

    async fn ensure_file_open(&self, guard: &mut Option<(String, File)>) -> Result<()> {
        let date_key = Utc::now().format("%Y-%m-%d").to_string();
        if let Some((existing_key, _)) = guard.as_ref() {
            if existing_key == &date_key {
                return Ok(());
            }
        }

        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("spans-{date_key}.jsonl"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        *guard = Some((date_key, file));
        Ok(())
    }
}

#[async_trait]
impl Sink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(&self, batch: &[Span]) -> SinkOutcome {
        let mut guard = self.current.lock().await;
        if let Err(e) = self.ensure_file_open(&mut guard).await {
            return SinkOutcome::TransientFailure(e.to_string());
        }
        let (_, file) = guard.as_mut().expect("file opened above");

        for span in batch {
            let line = match serde_json::to_string(span) {
                Ok(mut l) => {
                    l.push('\n');
                    l
                }
                Err(e) => return SinkOutcome::PermanentFailure(e.to_string()),
            };
            if let Err(e) = file.write_all(line.as_bytes()).await {
                return SinkOutcome::TransientFailure(e.to_string());
            }
        }
        SinkOutcome::Success
    }

    async fn flush(&self) -> Result<()> {
        let mut guard = self.current.lock().await;
        if let Some((_, file)) = guard.as_mut() {
            file.flush()
                .await
                .map_err(|e| CoreError::Storage(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenttrace_core::domain::SpanKind;

    #[tokio::test]
    async fn writes_one_line_per_span_for_today() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        let spans = vec![
            agenttrace_core::domain::Span::builder(SpanKind::Agent, "a").build(),
            agenttrace_core::domain::Span::builder(SpanKind::ToolCall, "b").build(),
        ];
        let outcome = sink.export(&spans).await;
        assert_eq!(outcome, SinkOutcome::Success);
        sink.flush().await.unwrap();

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let content = fs::read_to_string(dir.path().join(format!("spans-{today}.jsonl")))
            .await
            .unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
