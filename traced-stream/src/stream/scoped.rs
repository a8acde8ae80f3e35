use crate::stream::{BoxError, Source, Subscriber, Subscription};
use crate::Context;
use std::fmt;

/// Decorates a [`Source`] so that a captured [`Context`] is active for every
/// forwarded notification.
///
/// This is the propagation-only counterpart of
/// [`TracedSource`](crate::stream::TracedSource): it never creates, mutates,
/// or ends a span, it only re-enters the captured scope around each
/// notification. Its main use is rebinding nested payloads (a response body
/// stream, say) so their consumers observe the trace context of the operation
/// that produced them, however far from that scope they subscribe.
pub struct ScopedSource<T: 'static> {
    source: Box<dyn Source<T>>,
    cx: Context,
}

impl<T> ScopedSource<T> {
    /// Wrap `source` so its notifications are delivered within `cx`.
    pub fn new<S>(source: S, cx: Context) -> Self
    where
        S: Source<T> + 'static,
    {
        ScopedSource {
            source: Box::new(source),
            cx,
        }
    }

    /// Wrap `source` with the context that is current at this call.
    pub fn with_current<S>(source: S) -> Self
    where
        S: Source<T> + 'static,
    {
        ScopedSource::new(source, Context::current())
    }
}

impl<T> fmt::Debug for ScopedSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedSource").field("cx", &self.cx).finish()
    }
}

impl<T: 'static> Source<T> for ScopedSource<T> {
    fn subscribe(self: Box<Self>, subscriber: Box<dyn Subscriber<T>>) {
        let this = *self;
        let bridge = Box::new(ScopedSubscriber {
            downstream: subscriber,
            cx: this.cx.clone(),
        });
        let _guard = this.cx.attach();
        this.source.subscribe(bridge);
    }

    fn single_valued(&self) -> bool {
        self.source.single_valued()
    }
}

struct ScopedSubscriber<T: 'static> {
    downstream: Box<dyn Subscriber<T>>,
    cx: Context,
}

impl<T: 'static> Subscriber<T> for ScopedSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Box<dyn Subscription>) {
        let _guard = self.cx.clone().attach();
        self.downstream.on_subscribe(subscription);
    }

    fn on_next(&mut self, value: T) {
        let _guard = self.cx.clone().attach();
        self.downstream.on_next(value);
    }

    fn on_error(&mut self, error: BoxError) {
        let _guard = self.cx.clone().attach();
        self.downstream.on_error(error);
    }

    fn on_complete(&mut self) {
        let _guard = self.cx.clone().attach();
        self.downstream.on_complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::stream::{RecordingSubscriber, ValuesSource};
    use crate::testing::trace::TestTracer;
    use crate::trace::{Span, TraceContextExt, Tracer};

    #[test]
    fn captured_context_is_active_during_notifications() {
        let tracer = TestTracer::new();
        let span = tracer.start("holder");
        let span_context = Span::span_context(&span).clone();
        let cx = Context::new().with_span(span);

        let scoped = ScopedSource::new(ValuesSource::new(vec![1u32, 2]), cx);
        let (subscriber, log) = RecordingSubscriber::new();
        Box::new(scoped).subscribe(Box::new(subscriber));

        assert_eq!(log.values(), vec![1, 2]);
        for observed in log.span_contexts() {
            assert_eq!(observed, span_context);
        }
        // Propagation only: the span itself is untouched.
        assert_eq!(tracer.span_named("holder").unwrap().end_count(), 0);
    }

    #[test]
    fn cardinality_forwards_from_inner() {
        let scoped = ScopedSource::with_current(ValuesSource::single(1u32));
        assert!(scoped.single_valued());
    }
}
