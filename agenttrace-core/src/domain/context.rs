use std::cell::RefCell;

use super::ids::{SpanId, TraceId};

tokio::task_local! {
    static SPAN_STACK: RefCell<Vec<(SpanId, TraceId)>>;
}

/// Cooperative per-task current-span slot (spec.md §4.1 "Context propagation").
///
/// A nested `start_span` pushes onto the task-local stack; `end_span` pops.
/// Implementations that hop threads (std::thread, rayon) must carry the
/// returned `(SpanId, TraceId)` pair across the boundary explicitly — there is
/// no ambient propagation across OS threads by design.
pub struct SpanContext;

impl SpanContext {
    /// Runs `f` with a fresh, empty span stack scope. Call once per top-level
    /// task (e.g. once per incoming request).
    pub async fn scope<F, Fut, T>(f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        SPAN_STACK.scope(RefCell::new(Vec::new()), f()).await
    }

    /// The innermost currently-open span in this task, if any.
    pub fn current() -> Option<(SpanId, TraceId)> {
        SPAN_STACK
            .try_with(|stack| stack.borrow().last().copied())
            .unwrap_or(None)
    }

    /// Pushes a span onto the stack. Call after `Span::builder(..).build()`.
    pub fn push(span_id: SpanId, trace_id: TraceId) {
        let _ = SPAN_STACK.try_with(|stack| stack.borrow_mut().push((span_id, trace_id)));
    }

    /// Pops the current span. No-op (never panics) if the stack is already
    /// empty or the scope was never entered — per spec.md §4.1, context
    /// handling must never block or fail the caller.
    pub fn pop() {
        let _ = SPAN_STACK.try_with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nested_push_pop_restores_parent() {
        SpanContext::scope(|| async {
            assert!(SpanContext::current().is_none());
            let root = (SpanId::new(), TraceId::new());
            SpanContext::push(root.0, root.1);
            assert_eq!(SpanContext::current(), Some(root));

            let child = (SpanId::new(), root.1);
            SpanContext::push(child.0, child.1);
            assert_eq!(SpanContext::current(), Some(child));

            SpanContext::pop();
            assert_eq!(SpanContext::current(), Some(root));

            SpanContext::pop();
            assert!(SpanContext::current().is_none());
        })
        .await;
    }

    #[tokio::test]
    async fn pop_without_scope_never_panics() {
        SpanContext::pop();
        assert!(SpanContext::current().is_none());
    }
}
