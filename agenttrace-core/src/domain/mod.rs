pub mod context;
pub mod eval;
pub mod ids;
pub mod span;
pub mod trace;

pub use context::SpanContext;
pub use eval::{EvalResult, EvalScore};
pub use ids::*;
pub use span::{Span, SpanBuilder, SpanErrorInfo, SpanEvent, SpanKind, SpanStatus};
pub use trace::Trace;
