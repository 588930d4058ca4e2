use std::fmt;

/// Correlation token carried by a transaction for tracing.
///
/// It identifies work in logs and nothing else: replacing or dropping it never
/// cancels, commits or rolls back a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceContext {
    trace_id: u64,
    span_id: u64,
    parent_span_id: Option<u64>,
}

impl TraceContext {
    /// Start a new trace
    pub fn new() -> Self {
        TraceContext {
            trace_id: rand::random(),
            span_id: rand::random(),
            parent_span_id: None,
        }
    }

    /// Rebuild a context received from elsewhere
    pub fn from_parts(trace_id: u64, span_id: u64) -> Self {
        TraceContext {
            trace_id,
            span_id,
            parent_span_id: None,
        }
    }

    /// Derive a child span within the same trace
    pub fn child(&self) -> Self {
        TraceContext {
            trace_id: self.trace_id,
            span_id: rand::random(),
            parent_span_id: Some(self.span_id),
        }
    }

    pub fn trace_id(&self) -> u64 {
        self.trace_id
    }

    pub fn span_id(&self) -> u64 {
        self.span_id
    }

    pub fn parent_span_id(&self) -> Option<u64> {
        self.parent_span_id
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        TraceContext::new()
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}/{:016x}", self.trace_id, self.span_id)
    }
}
