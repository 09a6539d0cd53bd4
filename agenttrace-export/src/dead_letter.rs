use std::path::{Path, PathBuf};

use agenttrace_core::domain::Span;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use ulid::Ulid;

use crate::error::{ExportError, Result};

/// Batches that exhaust retries or are still in-flight at shutdown timeout
/// are appended to `<root>/_deadletter/batch-<ulid>.jsonl` (spec.md §6
/// "Persisted state layout").
pub struct DeadLetterWriter {
    root: PathBuf,
}

impl DeadLetterWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn write_batch(&self, sink_name: &str, spans: &[Span]) -> Result<PathBuf> {
        let dir = self.root.join("_deadletter");
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| ExportError::DeadLetter(e.to_string()))?;

        let filename = format!("batch-{}.jsonl", Ulid::new());
        let path = dir.join(filename);

        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)
            .await
            .map_err(|e| ExportError::DeadLetter(e.to_string()))?;

        for span in spans {
            let mut line =
                serde_json::to_string(span).map_err(|e| ExportError::DeadLetter(e.to_string()))?;
            line.push('\n');
            file.write_all(line.as_bytes())
                .await
                .map_err(|e| ExportError::DeadLetter(e.to_string()))?;
        }
        file.write_all(format!("# sink={sink_name}\n").as_bytes())
            .await
            .map_err(|e| ExportError::DeadLetter(e.to_string()))?;

        Ok(path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenttrace_core::domain::SpanKind;

    #[tokio::test]
    async fn writes_one_line_per_span() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DeadLetterWriter::new(dir.path());
        let spans = vec![agenttrace_core::domain::Span::builder(SpanKind::Agent, "run").build()];
        let path = writer.write_batch("http", &spans).await.unwrap();
        let content = fs::read_to_string(path).await.unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
