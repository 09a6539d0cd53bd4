use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{SpanId, TraceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Agent,
    LlmCall,
    ToolCall,
    Retrieval,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Ok,
    Error,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanEvent {
    pub ts: DateTime<Utc>,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanErrorInfo {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// A single operation in an agent's execution trace (spec.md §3 "Span").
///
/// Immutable after `close()`. Spans never hold a reference to their parent or
/// children; trees are reconstructed on demand by indexing on
/// `(trace_id, parent_span_id)` (spec.md §9, avoiding cyclic ownership).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub span_id: SpanId,
    pub trace_id: TraceId,
    pub parent_span_id: Option<SpanId>,
    pub kind: SpanKind,
    pub name: String,
    pub start_ts: DateTime<Utc>,
    pub end_ts: Option<DateTime<Utc>>,
    pub status: SpanStatus,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SpanEvent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<SpanId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SpanErrorInfo>,
}

impl Span {
    pub fn builder(kind: SpanKind, name: impl Into<String>) -> SpanBuilder {
        SpanBuilder::new(kind, name)
    }

    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    pub fn is_closed(&self) -> bool {
        self.end_ts.is_some()
    }

    /// `end_ts >= start_ts` (spec.md §8 invariant). Open spans trivially hold.
    pub fn duration_is_valid(&self) -> bool {
        match self.end_ts {
            Some(end) => end >= self.start_ts,
            None => true,
        }
    }

    /// Closes the span with `status=ok` (or `error` if `record_error` was
    /// called beforehand and never reset).
    pub fn close(&mut self, at: DateTime<Utc>) {
        if self.end_ts.is_none() {
            self.end_ts = Some(at);
        }
    }

    /// Attaches error info and marks status=error without terminating the
    /// span (spec.md §4.1 "record_error").
    pub fn record_error(&mut self, kind: impl Into<String>, message: impl Into<String>, stack: Option<String>) {
        self.status = SpanStatus::Error;
        self.error = Some(SpanErrorInfo {
            kind: kind.into(),
            message: message.into(),
            stack,
        });
    }

    /// Best-effort close for a span still open when the export pipeline
    /// drains on shutdown: status=cancelled, end_ts synthesized from the last
    /// observed event (spec.md §4.1 "Failure semantics").
    pub fn close_cancelled(&mut self, fallback_end: DateTime<Utc>) {
        if self.end_ts.is_some() {
            return;
        }
        self.status = SpanStatus::Cancelled;
        let synthetic = self.events.last().map(|e| e.ts).unwrap_or(fallback_end);
        self.end_ts = Some(synthetic.max(self.start_ts));
    }

    pub fn add_event(&mut self, name: impl Into<String>, attrs: BTreeMap<String, Value>) {
        self.events.push(SpanEvent {
            ts: Utc::now(),
            name: name.into(),
            attrs,
        });
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Sets the conventional llm_call attributes (spec.md §4.1).
    pub fn set_llm_call(&mut self, provider: &str, model: &str, messages: Value, input_tokens: u64, output_tokens: u64) {
        self.set_attr("llm.provider", provider);
        self.set_attr("llm.model", model);
        self.set_attr("llm.messages", messages);
        self.set_attr("llm.input_tokens", input_tokens);
        self.set_attr("llm.output_tokens", output_tokens);
    }

    /// Sets the conventional tool_call attributes (spec.md §4.1).
    pub fn set_tool_call(&mut self, tool: &str, args: Value, result: Option<Value>, error: Option<&str>) {
        self.set_attr("tool.name", tool);
        self.set_attr("tool.args", args);
        if let Some(result) = result {
            self.set_attr("tool.result", result);
        }
        if let Some(error) = error {
            self.set_attr("tool.error", error);
        }
    }

    /// Sets the conventional retrieval attributes (spec.md §4.1).
    pub fn set_retrieval(&mut self, query: &str, documents: Value, scores: Vec<f64>) {
        self.set_attr("retrieval.query", query);
        self.set_attr("retrieval.documents", documents);
        self.set_attr(
            "retrieval.scores",
            scores.into_iter().map(Value::from).collect::<Vec<_>>(),
        );
    }
}

pub struct SpanBuilder {
    span_id: SpanId,
    trace_id: Option<TraceId>,
    parent_span_id: Option<SpanId>,
    kind: SpanKind,
    name: String,
    start_ts: DateTime<Utc>,
}

impl SpanBuilder {
    fn new(kind: SpanKind, name: impl Into<String>) -> Self {
        Self {
            span_id: SpanId::new(),
            trace_id: None,
            parent_span_id: None,
            kind,
            name: name.into(),
            start_ts: Utc::now(),
        }
    }

    pub fn trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    pub fn parent(mut self, parent: SpanId, parent_trace: TraceId) -> Self {
        self.parent_span_id = Some(parent);
        self.trace_id = Some(parent_trace);
        self
    }

    pub fn start_ts(mut self, start_ts: DateTime<Utc>) -> Self {
        self.start_ts = start_ts;
        self
    }

    /// Builds the span. A span without an explicit trace/parent becomes the
    /// root of a fresh trace (spec.md §4.1).
    pub fn build(self) -> Span {
        Span {
            span_id: self.span_id,
            trace_id: self.trace_id.unwrap_or_else(TraceId::new),
            parent_span_id: self.parent_span_id,
            kind: self.kind,
            name: self.name,
            start_ts: self.start_ts,
            end_ts: None,
            status: SpanStatus::Ok,
            attributes: BTreeMap::new(),
            events: Vec::new(),
            links: Vec::new(),
            input: None,
            output: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_without_parent_is_root() {
        let span = Span::builder(SpanKind::Agent, "run").build();
        assert!(span.is_root());
    }

    #[test]
    fn parent_forces_shared_trace_id() {
        let root = Span::builder(SpanKind::Agent, "run").build();
        let child = Span::builder(SpanKind::ToolCall, "search")
            .parent(root.span_id, root.trace_id)
            .build();
        assert_eq!(child.trace_id, root.trace_id);
        assert!(!child.is_root());
    }

    #[test]
    fn close_cancelled_never_precedes_start() {
        let mut span = Span::builder(SpanKind::Agent, "run").build();
        let before_start = span.start_ts - chrono::Duration::seconds(5);
        span.close_cancelled(before_start);
        assert!(span.duration_is_valid());
        assert_eq!(span.status, SpanStatus::Cancelled);
    }

    #[test]
    fn record_error_preserves_open_span() {
        let mut span = Span::builder(SpanKind::ToolCall, "search").build();
        span.record_error("timeout", "tool timed out", None);
        assert_eq!(span.status, SpanStatus::Error);
        assert!(!span.is_closed());
    }
}
