//! No-op trace impls
//!
//! Useful as the tracer half of a wrapper that only continues existing spans,
//! and for testing purposes, as they carry minimal resource and runtime
//! impact.
use crate::trace::{self, SpanBuilder, SpanContext, TraceContextExt};
use crate::{Context, KeyValue};
use std::borrow::Cow;
use std::time::SystemTime;

/// A no-op instance of a `Span`.
#[derive(Clone, Debug)]
pub struct NoopSpan {
    span_context: SpanContext,
}

impl Default for NoopSpan {
    fn default() -> Self {
        NoopSpan::new()
    }
}

impl NoopSpan {
    /// Creates a new `NoopSpan` instance.
    pub fn new() -> Self {
        NoopSpan {
            span_context: SpanContext::NONE,
        }
    }

    pub(crate) fn with_span_context(span_context: SpanContext) -> Self {
        NoopSpan { span_context }
    }
}

impl trace::Span for NoopSpan {
    /// Ignores all events
    fn add_event_with_timestamp<T>(
        &mut self,
        _name: T,
        _timestamp: SystemTime,
        _attributes: Vec<KeyValue>,
    ) where
        T: Into<Cow<'static, str>>,
    {
        // Ignored
    }

    /// Returns an invalid `SpanContext` unless one was propagated.
    fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// Returns false, signifying that this span is never recording.
    fn is_recording(&self) -> bool {
        false
    }

    /// Ignores all attributes
    fn set_attribute(&mut self, _attribute: KeyValue) {
        // Ignored
    }

    /// Ignores status
    fn set_status(&mut self, _status: trace::Status) {
        // Ignored
    }

    /// Ignores `Span` endings
    fn end_with_timestamp(&mut self, _timestamp: SystemTime) {
        // Ignored
    }
}

/// A no-op instance of a `Tracer`.
#[derive(Clone, Debug, Default)]
pub struct NoopTracer {
    _private: (),
}

impl NoopTracer {
    /// Create a new no-op tracer
    pub fn new() -> Self {
        NoopTracer { _private: () }
    }
}

impl trace::Tracer for NoopTracer {
    type Span = NoopSpan;

    /// Builds a `NoopSpan` from a `SpanBuilder`.
    ///
    /// If the context's current span contains a valid span context, it is
    /// propagated.
    fn build_with_context(&self, _builder: SpanBuilder, parent_cx: &Context) -> Self::Span {
        if parent_cx.has_active_span() {
            NoopSpan::with_span_context(parent_cx.span().span_context().clone())
        } else {
            NoopSpan::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::trace::TestSpan;
    use crate::trace::{SpanId, TraceId, Tracer};

    fn valid_span_context() -> SpanContext {
        SpanContext::new(TraceId::from_u128(42), SpanId::from_u64(42))
    }

    #[test]
    fn noop_tracer_defaults_to_invalid_span() {
        let tracer = NoopTracer::new();
        let span = tracer.start_with_context("foo", &Context::new());
        assert!(!trace::Span::span_context(&span).is_valid());
    }

    #[test]
    fn noop_tracer_propagates_valid_span_context_from_context() {
        let tracer = NoopTracer::new();
        let cx = Context::new().with_span(TestSpan::with_span_context(valid_span_context()));
        let span = tracer.start_with_context("foo", &cx);
        assert!(trace::Span::span_context(&span).is_valid());
    }
}
