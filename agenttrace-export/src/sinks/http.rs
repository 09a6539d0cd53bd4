use std::time::Duration;

use agenttrace_core::domain::Span;
use agenttrace_core::error::Result;
use agenttrace_core::traits::{Sink, SinkOutcome};
use async_trait::async_trait;
use reqwest::StatusCode;

/// Batched-POST sink for a remote collector endpoint.
pub struct HttpSink {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            name: "http".to_string(),
            url: url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("http client builds"),
        }
    }
}

#[async_trait]
impl Sink for HttpSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(&self, batch: &[Span]) -> SinkOutcome {
        let response = self.client.post(&self.url).json(batch).send().await;

        match response {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    SinkOutcome::Success
                } else if is_retryable_status(status) {
                    SinkOutcome::TransientFailure(format!("http {status}"))
                } else {
                    SinkOutcome::PermanentFailure(format!("http {status}"))
                }
            }
            Err(e) if e.is_timeout() || e.is_connect() => {
                SinkOutcome::TransientFailure(e.to_string())
            }
            Err(e) => SinkOutcome::PermanentFailure(e.to_string()),
        }
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}
