use crate::stream::{
    BoxError, CarryContext, NoopObserver, Source, StreamObserver, Subscriber, Subscription,
};
use crate::trace::{BoxedTracer, SpanBuilder, TraceContextExt, Tracer};
use crate::{Context, ContextGuard};
use std::fmt;
use std::sync::Arc;

/// Decorates a [`Source`] so that a span's lifecycle is bound to the stream's
/// lifecycle and the span's context is active for every downstream
/// notification.
///
/// The wrapper operates in one of two modes:
///
/// * **New-span mode** ([`TracedSource::new`]): a [`SpanBuilder`] describes
///   the span to start at subscribe time. The parent context is captured when
///   the wrapper is constructed, so the span chains onto whatever span was
///   active at that point. The wrapper owns the span and finishes it at the
///   stream's terminal notification.
/// * **Continue-mode** ([`TracedSource::continuing`]): the stream operates on
///   whatever span is active when `subscribe` is called. No span is created,
///   and none is finished unless the observer opts in via
///   [`StreamObserver::is_continued`]. With no active span at all, the
///   wrapper subscribes the downstream directly to the source and adds no
///   tracing overhead.
///
/// Each notification independently re-activates the span's context before it
/// is forwarded, so sources that hop between threads mid-stream still deliver
/// every notification inside the right scope. An owned span is finished
/// exactly once, no matter which terminal path fires: the first value (for
/// sources declared single-valued), the error notification, or completion.
/// The finish step runs from a drop guard, so a panicking observer hook or
/// downstream subscriber on a terminal notification cannot leak the span.
///
/// Cancellation is forwarded through the [`Subscription`] untouched and does
/// not finish the span: a stream cancelled before any terminal notification
/// leaves its span open. Callers that cancel must bound span lifetime
/// themselves, e.g. with timeouts.
pub struct TracedSource<T: 'static> {
    source: Box<dyn Source<T>>,
    new_span: Option<NewSpan>,
    single_valued: bool,
    observer: Arc<dyn StreamObserver<T> + Send + Sync>,
}

struct NewSpan {
    tracer: BoxedTracer,
    builder: SpanBuilder,
    parent_cx: Context,
}

impl<T> TracedSource<T> {
    /// Wrap `source` so that subscribing starts the span described by
    /// `builder` and finishes it at the stream's terminal notification.
    ///
    /// The currently active context is captured as the new span's parent.
    pub fn new<S, Tr>(source: S, tracer: Tr, builder: SpanBuilder) -> Self
    where
        S: Source<T> + 'static,
        Tr: Tracer + Send + Sync + 'static,
    {
        let single_valued = source.single_valued();
        TracedSource {
            source: Box::new(source),
            new_span: Some(NewSpan {
                tracer: BoxedTracer::new(tracer),
                builder,
                parent_cx: Context::current(),
            }),
            single_valued,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Wrap `source` so that its notifications are delivered within the scope
    /// of whatever span is active when `subscribe` is called.
    ///
    /// The span is not finished by this stream unless the observer returns
    /// `true` from [`StreamObserver::is_continued`].
    pub fn continuing<S>(source: S) -> Self
    where
        S: Source<T> + 'static,
    {
        let single_valued = source.single_valued();
        TracedSource {
            source: Box::new(source),
            new_span: None,
            single_valued,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Replace the default no-op observer.
    pub fn with_observer<O>(mut self, observer: O) -> Self
    where
        O: StreamObserver<T> + Send + Sync + 'static,
    {
        self.observer = Arc::new(observer);
        self
    }

    /// Override the cardinality probed from the wrapped source.
    pub fn with_single_valued(mut self, single_valued: bool) -> Self {
        self.single_valued = single_valued;
        self
    }
}

impl<T> fmt::Debug for TracedSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracedSource")
            .field("new_span", &self.new_span.as_ref().map(|s| &s.builder.name))
            .field("single_valued", &self.single_valued)
            .finish()
    }
}

impl<T> Source<T> for TracedSource<T>
where
    T: CarryContext + 'static,
{
    fn subscribe(self: Box<Self>, subscriber: Box<dyn Subscriber<T>>) {
        let this = *self;
        let (cx, finish_on_close) = match this.new_span {
            Some(new_span) => {
                let span = new_span
                    .builder
                    .start_with_context(&new_span.tracer, &new_span.parent_cx);
                (new_span.parent_cx.with_span(span), true)
            }
            None => {
                let current = Context::current();
                if !current.has_active_span() {
                    // No span to continue: subscribe straight through with no
                    // tracing overhead at all.
                    crate::diag_debug!(name: "subscribe_passthrough");
                    return this.source.subscribe(subscriber);
                }
                (current, this.observer.is_continued())
            }
        };

        let bridge = Box::new(TracedSubscriber {
            downstream: subscriber,
            cx: cx.clone(),
            observer: this.observer,
            single_valued: this.single_valued,
            finish_on_close,
            finished: false,
        });

        // The activation covers only the synchronous portion of `subscribe`;
        // asynchronous notifications re-enter the scope individually.
        let _guard = attach_if_inactive(&cx);
        this.source.subscribe(bridge);
    }

    fn single_valued(&self) -> bool {
        self.single_valued
    }
}

/// Bridges the downstream subscriber into the span's context.
///
/// `finished` records that a terminal notification was delivered (or, for
/// single-valued streams, that the one value was); it is what makes the span
/// end idempotent when a source signals completion after the value, or an
/// error after a fast-path finish.
struct TracedSubscriber<T: 'static> {
    downstream: Box<dyn Subscriber<T>>,
    cx: Context,
    observer: Arc<dyn StreamObserver<T> + Send + Sync>,
    single_valued: bool,
    finish_on_close: bool,
    finished: bool,
}

impl<T> Subscriber<T> for TracedSubscriber<T>
where
    T: CarryContext + 'static,
{
    fn on_subscribe(&mut self, subscription: Box<dyn Subscription>) {
        let _scope = attach_if_inactive(&self.cx);
        self.observer.on_subscribe(&self.cx.span());
        self.downstream.on_subscribe(subscription);
    }

    fn on_next(&mut self, value: T) {
        let fast_path = self.single_valued && !self.finished;
        if self.single_valued {
            self.finished = true;
        }
        // Declared before the scope guard: drop order detaches the context
        // first, then ends the span.
        let _end = EndScope::new(&self.cx, fast_path && self.finish_on_close);
        let _scope = attach_if_inactive(&self.cx);
        let value = value.carry_context(&self.cx);
        self.observer.on_next(&value, &self.cx.span());
        self.downstream.on_next(value);
    }

    fn on_error(&mut self, error: BoxError) {
        let first_terminal = !self.finished;
        self.finished = true;
        let end = first_terminal && self.finish_on_close && self.observer.finish_on_error();
        let _end = EndScope::new(&self.cx, end);
        let _scope = attach_if_inactive(&self.cx);
        // The error is always recorded on the span, whatever the finish
        // policy says.
        self.cx.span().record_error(error.as_ref());
        self.observer.on_error(error.as_ref(), &self.cx.span());
        self.downstream.on_error(error);
    }

    fn on_complete(&mut self) {
        let end = !self.finished && self.finish_on_close;
        self.finished = true;
        let _end = EndScope::new(&self.cx, end);
        let _scope = attach_if_inactive(&self.cx);
        self.downstream.on_complete();
        self.observer.on_finish(&self.cx.span());
    }
}

/// Activate `cx` unless its span is already the current one.
fn attach_if_inactive(cx: &Context) -> Option<ContextGuard> {
    if Context::map_current(|current| current.same_span(cx)) {
        None
    } else {
        Some(cx.clone().attach())
    }
}

/// Ends the context's span when dropped, if armed.
///
/// Running the span end from a drop guard keeps the exactly-once guarantee
/// intact when an observer hook or the downstream subscriber panics mid
/// terminal notification.
struct EndScope(Option<Context>);

impl EndScope {
    fn new(cx: &Context, armed: bool) -> Self {
        EndScope(armed.then(|| cx.clone()))
    }
}

impl Drop for EndScope {
    fn drop(&mut self) {
        if let Some(cx) = self.0.take() {
            cx.span().end();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::trace::TestTracer;

    #[test]
    fn reattach_skipped_when_span_already_current() {
        let tracer = TestTracer::new();
        let cx = Context::current().with_span(tracer.start("op"));
        let _guard = cx.clone().attach();
        assert!(attach_if_inactive(&cx).is_none());

        let other = Context::current().with_span(tracer.start("other"));
        assert!(attach_if_inactive(&other).is_some());
    }

    #[test]
    fn end_scope_is_inert_unless_armed() {
        let tracer = TestTracer::new();
        let cx = Context::new().with_span(tracer.start("op"));

        drop(EndScope::new(&cx, false));
        assert_eq!(tracer.finished_count(), 0);

        drop(EndScope::new(&cx, true));
        assert_eq!(tracer.finished_count(), 1);
    }
}
