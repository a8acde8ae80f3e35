//! Context extensions for tracing.
use crate::{
    trace::{BoxedSpan, Span, SpanContext, Status, TraceError},
    Context, ContextGuard, KeyValue,
};
use std::{borrow::Cow, error::Error, sync::Mutex};

const NOOP_SPAN: SynchronizedSpan = SynchronizedSpan {
    span_context: SpanContext::NONE,
    inner: None,
};

/// A reference to the currently active span in this context.
#[derive(Debug)]
pub struct SpanRef<'a>(&'a SynchronizedSpan);

#[derive(Debug)]
pub(crate) struct SynchronizedSpan {
    /// Immutable span context
    span_context: SpanContext,
    /// Mutable span inner that requires synchronization
    inner: Option<Mutex<BoxedSpan>>,
}

impl From<SpanContext> for SynchronizedSpan {
    fn from(value: SpanContext) -> Self {
        Self {
            span_context: value,
            inner: None,
        }
    }
}

impl<T: Span + Send + Sync + 'static> From<T> for SynchronizedSpan {
    fn from(value: T) -> Self {
        Self {
            span_context: value.span_context().clone(),
            inner: Some(Mutex::new(BoxedSpan::new(value))),
        }
    }
}

impl SpanRef<'_> {
    fn with_inner_mut<F: FnOnce(&mut BoxedSpan)>(&self, f: F) {
        if let Some(ref inner) = self.0.inner {
            match inner.lock() {
                Ok(mut locked) => f(&mut locked),
                Err(err) => {
                    let err = TraceError::from(err.to_string());
                    let message = err.to_string();
                    crate::diag_warn!(name: "span_lock_poisoned", error = message.as_str());
                }
            }
        }
    }
}

impl SpanRef<'_> {
    /// Record an event in the context of this span.
    pub fn add_event<T>(&self, name: T, attributes: Vec<KeyValue>)
    where
        T: Into<Cow<'static, str>>,
    {
        self.with_inner_mut(|inner| inner.add_event(name, attributes))
    }

    /// Record an error as an event for this span.
    ///
    /// An additional call to [`SpanRef::set_status`] is required if the status
    /// of the span should be set to error, as this method does not change the
    /// span status.
    ///
    /// If this span is not being recorded then this method does nothing.
    pub fn record_error(&self, err: &dyn Error) {
        self.with_inner_mut(|inner| inner.record_error(err))
    }

    /// Record an event with a timestamp in the context of this span.
    pub fn add_event_with_timestamp<T>(
        &self,
        name: T,
        timestamp: std::time::SystemTime,
        attributes: Vec<KeyValue>,
    ) where
        T: Into<Cow<'static, str>>,
    {
        self.with_inner_mut(move |inner| {
            inner.add_event_with_timestamp(name, timestamp, attributes)
        })
    }

    /// A reference to the [`SpanContext`] for this span.
    pub fn span_context(&self) -> &SpanContext {
        &self.0.span_context
    }

    /// Returns `true` if this span is recording information.
    ///
    /// Spans stop recording after they have ended.
    pub fn is_recording(&self) -> bool {
        self.0
            .inner
            .as_ref()
            .and_then(|inner| inner.lock().ok().map(|active| active.is_recording()))
            .unwrap_or(false)
    }

    /// Set an attribute of this span.
    ///
    /// Setting an attribute with the same key as an existing attribute
    /// overwrites the existing attribute's value.
    pub fn set_attribute(&self, attribute: KeyValue) {
        self.with_inner_mut(move |inner| inner.set_attribute(attribute))
    }

    /// Sets the status of this `Span`.
    ///
    /// If used, this will override the default span status, which is
    /// [`Status::Unset`].
    pub fn set_status(&self, status: Status) {
        self.with_inner_mut(move |inner| inner.set_status(status))
    }

    /// Signals that the operation described by this span has now ended.
    pub fn end(&self) {
        self.end_with_timestamp(std::time::SystemTime::now());
    }

    /// Signals that the operation described by this span ended at the given time.
    pub fn end_with_timestamp(&self, timestamp: std::time::SystemTime) {
        self.with_inner_mut(move |inner| inner.end_with_timestamp(timestamp))
    }
}

/// Methods for storing and retrieving trace data in a [`Context`].
///
/// See [`Context`] for examples of setting and retrieving the current context.
pub trait TraceContextExt {
    /// Returns a clone of the current context with the included [`Span`].
    ///
    /// # Examples
    ///
    /// ```
    /// use traced_stream::{trace::{noop::NoopTracer, TraceContextExt, Tracer}, Context};
    ///
    /// let tracer = NoopTracer::new();
    ///
    /// // build a span
    /// let span = tracer.start("parent_span");
    ///
    /// // create a new context from the currently active context that includes this span
    /// let cx = Context::current_with_span(span);
    ///
    /// // create a child span by explicitly specifying the parent context
    /// let child = tracer.start_with_context("child_span", &cx);
    /// # drop(child)
    /// ```
    fn current_with_span<T: Span + Send + Sync + 'static>(span: T) -> Self;

    /// Returns a clone of this context with the included span.
    fn with_span<T: Span + Send + Sync + 'static>(&self, span: T) -> Self;

    /// Returns a reference to this context's span, or the default no-op span
    /// if none has been set.
    ///
    /// # Examples
    ///
    /// ```
    /// use traced_stream::{trace::TraceContextExt, Context};
    ///
    /// // Add an event to the currently active span
    /// Context::map_current(|cx| cx.span().add_event("An event!", vec![]));
    /// ```
    fn span(&self) -> SpanRef<'_>;

    /// Returns whether or not an active span has been set.
    ///
    /// # Examples
    ///
    /// ```
    /// use traced_stream::{trace::TraceContextExt, Context};
    ///
    /// assert!(!Context::map_current(|cx| cx.has_active_span()));
    /// ```
    fn has_active_span(&self) -> bool;
}

impl TraceContextExt for Context {
    fn current_with_span<T: Span + Send + Sync + 'static>(span: T) -> Self {
        Context::current_with_synchronized_span(span.into())
    }

    fn with_span<T: Span + Send + Sync + 'static>(&self, span: T) -> Self {
        self.with_synchronized_span(span.into())
    }

    fn span(&self) -> SpanRef<'_> {
        if let Some(span) = self.span.as_ref() {
            SpanRef(span)
        } else {
            SpanRef(&NOOP_SPAN)
        }
    }

    fn has_active_span(&self) -> bool {
        self.span.is_some()
    }
}

/// Mark a given `Span` as active until the returned guard is dropped.
///
/// When the active span is made inactive, the previously active span is
/// restored. A span may be ended but still be active, and may be active on one
/// thread after it has been made inactive on another.
///
/// # Examples
///
/// ```
/// use traced_stream::trace::{get_active_span, mark_span_as_active, noop::NoopTracer, Tracer};
/// use traced_stream::KeyValue;
///
/// fn my_function() {
///     let tracer = NoopTracer::new();
///     // start an active span in one function
///     let span = tracer.start("span-name");
///     let _guard = mark_span_as_active(span);
///     // anything happening in functions we call can still access the active span...
///     my_other_function();
/// }
///
/// fn my_other_function() {
///     // call methods on the current span from
///     get_active_span(|span| {
///         span.add_event("An event!", vec![KeyValue::new("happened", true)]);
///     });
/// }
/// # my_function();
/// ```
#[must_use = "Dropping the guard detaches the context."]
pub fn mark_span_as_active<T: Span + Send + Sync + 'static>(span: T) -> ContextGuard {
    let cx = Context::current_with_span(span);
    cx.attach()
}

/// Executes a closure with a reference to this thread's current span.
pub fn get_active_span<F, T>(f: F) -> T
where
    F: FnOnce(SpanRef<'_>) -> T,
{
    Context::map_current(|cx| f(cx.span()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::trace::TestTracer;
    use crate::trace::Tracer;

    #[test]
    fn activation_restores_previous_span() {
        let tracer = TestTracer::new();
        let outer = tracer.start("outer");
        let outer_id = outer.span_context().span_id();
        let _outer_guard = mark_span_as_active(outer);

        let inner = tracer.start("inner");
        let inner_id = inner.span_context().span_id();
        assert_ne!(outer_id, inner_id);

        {
            let _inner_guard = mark_span_as_active(inner);
            get_active_span(|span| assert_eq!(span.span_context().span_id(), inner_id));
        }

        get_active_span(|span| assert_eq!(span.span_context().span_id(), outer_id));
    }

    #[test]
    fn span_methods_reach_the_bound_span() {
        let tracer = TestTracer::new();
        let cx = Context::new().with_span(tracer.start("op"));

        cx.span().set_attribute(KeyValue::new("answer", 42i64));
        cx.span().add_event("checkpoint", vec![]);
        assert!(cx.span().is_recording());
        cx.span().end();
        assert!(!cx.span().is_recording());

        let record = tracer.spans().pop().unwrap();
        assert_eq!(record.end_count(), 1);
        assert_eq!(record.event_names(), vec!["checkpoint".to_string()]);
    }

    #[test]
    fn unbound_context_yields_noop_span() {
        let cx = Context::new();
        assert!(!cx.has_active_span());
        assert!(!cx.span().is_recording());
        assert_eq!(*cx.span().span_context(), SpanContext::NONE);
    }
}
