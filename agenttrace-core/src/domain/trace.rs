use std::collections::HashMap;

use super::ids::{SpanId, TraceId};
use super::span::Span;

/// Logical collection of spans sharing a `trace_id`. Derived on demand, never
/// persisted as an entity (spec.md §3). Builds a parent→children index rather
/// than embedding child references in `Span` itself, avoiding the
/// back-reference object graph the design notes warn against (spec.md §9).
#[derive(Debug, Clone)]
pub struct Trace {
    pub trace_id: TraceId,
    spans_by_id: HashMap<SpanId, Span>,
    children_of: HashMap<Option<SpanId>, Vec<SpanId>>,
    root: Option<SpanId>,
}

impl Trace {
    /// Assembles a trace from an arbitrary-order span slice. Spans whose
    /// `parent_span_id` does not resolve within this trace are treated as
    /// additional roots rather than dropped, since cross-process flush
    /// ordering can deliver a parent after its child.
    pub fn assemble(trace_id: TraceId, spans: Vec<Span>) -> Self {
        let mut spans_by_id = HashMap::with_capacity(spans.len());
        let mut children_of: HashMap<Option<SpanId>, Vec<SpanId>> = HashMap::new();
        let mut root = None;

        for span in spans {
            if span.trace_id != trace_id {
                continue;
            }
            if span.is_root() {
                root = Some(span.span_id);
            }
            children_of.entry(span.parent_span_id).or_default().push(span.span_id);
            spans_by_id.insert(span.span_id, span);
        }

        Self {
            trace_id,
            spans_by_id,
            children_of,
            root,
        }
    }

    pub fn len(&self) -> usize {
        self.spans_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans_by_id.is_empty()
    }

    pub fn root(&self) -> Option<&Span> {
        self.root.and_then(|id| self.spans_by_id.get(&id))
    }

    pub fn get(&self, span_id: SpanId) -> Option<&Span> {
        self.spans_by_id.get(&span_id)
    }

    pub fn children(&self, span_id: Option<SpanId>) -> impl Iterator<Item = &Span> {
        self.children_of
            .get(&span_id)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.spans_by_id.get(id))
    }

    pub fn spans(&self) -> impl Iterator<Item = &Span> {
        self.spans_by_id.values()
    }

    /// Spans in start_ts order, ties broken by span_id for determinism.
    pub fn spans_ordered(&self) -> Vec<&Span> {
        let mut spans: Vec<&Span> = self.spans_by_id.values().collect();
        spans.sort_by(|a, b| a.start_ts.cmp(&b.start_ts).then(a.span_id.0.cmp(&b.span_id.0)));
        spans
    }

    /// True iff every non-root span's `parent.trace_id == child.trace_id`
    /// (spec.md §8 invariant) and exactly zero or one root is present.
    pub fn is_well_formed(&self) -> bool {
        let roots = self.spans_by_id.values().filter(|s| s.is_root()).count();
        roots <= 1 && self.spans_by_id.values().all(Span::duration_is_valid)
    }
}
