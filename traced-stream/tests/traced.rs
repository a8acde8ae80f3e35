use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use traced_stream::stream::{
    BoxError, CarryContext, ScopedSource, Source, StreamObserver, Subscriber, Subscription,
    TracedSource,
};
use traced_stream::testing::stream::{
    Notification, RecordingSubscriber, TestError, ThreadedSource, ValuesSource,
};
use traced_stream::testing::trace::TestTracer;
use traced_stream::trace::{
    mark_span_as_active, Span, SpanBuilder, SpanRef, Status, TraceContextExt, Tracer,
};
use traced_stream::{Context, KeyValue};

/// Observer counting every hook invocation.
#[derive(Clone, Default)]
struct CountingObserver {
    continued: bool,
    counts: Arc<Counts>,
}

#[derive(Default)]
struct Counts {
    subscribe: AtomicUsize,
    next: AtomicUsize,
    error: AtomicUsize,
    finish: AtomicUsize,
}

impl CountingObserver {
    fn continued() -> Self {
        CountingObserver {
            continued: true,
            ..Default::default()
        }
    }

    fn total(&self) -> usize {
        self.counts.subscribe.load(Ordering::SeqCst)
            + self.counts.next.load(Ordering::SeqCst)
            + self.counts.error.load(Ordering::SeqCst)
            + self.counts.finish.load(Ordering::SeqCst)
    }
}

impl<T> StreamObserver<T> for CountingObserver {
    fn is_continued(&self) -> bool {
        self.continued
    }

    fn on_subscribe(&self, _span: &SpanRef<'_>) {
        self.counts.subscribe.fetch_add(1, Ordering::SeqCst);
    }

    fn on_next(&self, _value: &T, _span: &SpanRef<'_>) {
        self.counts.next.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, _error: &(dyn Error + 'static), _span: &SpanRef<'_>) {
        self.counts.error.fetch_add(1, Ordering::SeqCst);
    }

    fn on_finish(&self, _span: &SpanRef<'_>) {
        self.counts.finish.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn single_valued_stream_ends_span_at_first_value() {
    let tracer = TestTracer::new();

    struct EndCheck {
        tracer: TestTracer,
        ended_before_complete: Arc<AtomicBool>,
    }

    impl Subscriber<String> for EndCheck {
        fn on_subscribe(&mut self, _subscription: Box<dyn Subscription>) {}

        fn on_next(&mut self, _value: String) {}

        fn on_error(&mut self, _error: BoxError) {
            unreachable!("source does not error");
        }

        fn on_complete(&mut self) {
            // The fast path must have ended the span before the source's own
            // completion signal arrives here.
            self.ended_before_complete
                .store(self.tracer.finished_count() == 1, Ordering::SeqCst);
        }
    }

    let ended_before_complete = Arc::new(AtomicBool::new(false));
    let traced = TracedSource::new(
        ValuesSource::single("ok".to_string()),
        tracer.clone(),
        SpanBuilder::from_name("one_shot"),
    );
    Box::new(traced).subscribe(Box::new(EndCheck {
        tracer: tracer.clone(),
        ended_before_complete: ended_before_complete.clone(),
    }));

    assert!(ended_before_complete.load(Ordering::SeqCst));
    let record = tracer.span_named("one_shot").unwrap();
    assert_eq!(record.end_count(), 1);
}

#[test]
fn multi_valued_stream_ends_span_once_at_completion() {
    let tracer = TestTracer::new();
    let observer = CountingObserver::default();

    let traced = TracedSource::new(
        ValuesSource::new(vec!["a", "b", "c"]),
        tracer.clone(),
        SpanBuilder::from_name("fetch_all"),
    )
    .with_observer(observer.clone());
    let (subscriber, log) = RecordingSubscriber::new();
    Box::new(traced).subscribe(Box::new(subscriber));

    // Values arrive in order, none dropped or duplicated.
    assert_eq!(log.values(), vec!["a", "b", "c"]);
    assert!(log.completed());
    assert!(matches!(log.entries()[0].0, Notification::Subscribe));

    // Every notification was delivered inside the span's scope.
    let record = tracer.span_named("fetch_all").unwrap();
    for span_context in log.span_contexts() {
        assert_eq!(&span_context, record.span_context());
    }

    assert_eq!(record.end_count(), 1);
    assert_eq!(observer.counts.next.load(Ordering::SeqCst), 3);
    assert_eq!(observer.counts.finish.load(Ordering::SeqCst), 1);
}

#[test]
fn immediate_error_is_recorded_once_and_forwarded_unaltered() {
    let tracer = TestTracer::new();
    let traced = TracedSource::new(
        ValuesSource::<String>::failing(TestError::new("boom")),
        tracer.clone(),
        SpanBuilder::from_name("doomed"),
    );
    let (subscriber, log) = RecordingSubscriber::new();
    Box::new(traced).subscribe(Box::new(subscriber));

    let record = tracer.span_named("doomed").unwrap();
    assert_eq!(record.end_count(), 1);

    // Exactly one error event on the span, carrying the message.
    assert_eq!(record.event_names(), vec!["exception".to_string()]);
    let (_, attributes) = record.events().pop().unwrap();
    assert!(attributes.contains(&KeyValue::new("exception.message", "boom".to_string())));

    // The downstream received the same error value, not a wrapper.
    let mut errors = log.take_errors();
    assert_eq!(errors.len(), 1);
    let error = errors.pop().unwrap();
    let error = error.downcast::<TestError>().expect("error was rewrapped");
    assert_eq!(error.0, "boom");
}

#[test]
fn continue_mode_without_active_span_is_pure_passthrough() {
    let observer = CountingObserver::continued();
    let traced = TracedSource::continuing(ValuesSource::new(vec![1u32, 2]))
        .with_observer(observer.clone());
    let (subscriber, log) = RecordingSubscriber::new();
    Box::new(traced).subscribe(Box::new(subscriber));

    // Values flow, but no hook fired and no span was ever involved.
    assert_eq!(log.values(), vec![1, 2]);
    assert!(log.completed());
    assert_eq!(observer.total(), 0);
    for span_context in log.span_contexts() {
        assert!(!span_context.is_valid());
    }
}

#[test]
fn continue_mode_annotates_active_span_without_ending_it() {
    let tracer = TestTracer::new();
    let observer = CountingObserver::default();
    let span = tracer.start("outer");
    let _guard = mark_span_as_active(span);

    let traced = TracedSource::continuing(ValuesSource::new(vec!["x", "y"]))
        .with_observer(observer.clone());
    let (subscriber, log) = RecordingSubscriber::new();
    Box::new(traced).subscribe(Box::new(subscriber));

    let record = tracer.span_named("outer").unwrap();
    for span_context in log.span_contexts() {
        assert_eq!(&span_context, record.span_context());
    }
    assert_eq!(observer.counts.next.load(Ordering::SeqCst), 2);

    // The stream neither created nor ended any span.
    assert_eq!(tracer.started_count(), 1);
    assert_eq!(record.end_count(), 0);
}

#[test]
fn continued_policy_ends_the_active_span_on_error() {
    let tracer = TestTracer::new();
    let span = tracer.start("filter_chain");
    let _guard = mark_span_as_active(span);

    let traced =
        TracedSource::continuing(ValuesSource::<String>::failing(TestError::new("cut short")))
            .with_observer(CountingObserver::continued());
    let (subscriber, _log) = RecordingSubscriber::new();
    Box::new(traced).subscribe(Box::new(subscriber));

    let record = tracer.span_named("filter_chain").unwrap();
    assert_eq!(record.end_count(), 1);
    assert_eq!(record.event_names(), vec!["exception".to_string()]);
}

#[test]
fn finish_on_error_policy_can_leave_the_span_open() {
    struct KeepOpenOnError;

    impl<T> StreamObserver<T> for KeepOpenOnError {
        fn finish_on_error(&self) -> bool {
            false
        }
    }

    let tracer = TestTracer::new();
    let traced = TracedSource::new(
        ValuesSource::<String>::failing(TestError::new("retryable")),
        tracer.clone(),
        SpanBuilder::from_name("attempt"),
    )
    .with_observer(KeepOpenOnError);
    let (subscriber, _log) = RecordingSubscriber::new();
    Box::new(traced).subscribe(Box::new(subscriber));

    let record = tracer.span_named("attempt").unwrap();
    // Error still recorded, span deliberately left open.
    assert_eq!(record.event_names(), vec!["exception".to_string()]);
    assert_eq!(record.end_count(), 0);
}

#[test]
fn cancellation_is_forwarded_and_does_not_end_the_span() {
    let tracer = TestTracer::new();
    let source = ValuesSource::new(vec![1u32, 2, 3]).hold_open();
    let probe = source.subscription();

    let traced = TracedSource::new(source, tracer.clone(), SpanBuilder::from_name("cancelled"));
    let (subscriber, log) = RecordingSubscriber::new();
    Box::new(traced).subscribe(Box::new(subscriber));

    assert_eq!(log.values(), vec![1, 2, 3]);
    assert!(!log.completed());

    // Cancel through the subscription the wrapper forwarded.
    assert!(log.cancel());
    assert!(probe.is_cancelled());

    // The span was started but never ended: callers bound it with timeouts.
    let record = tracer.span_named("cancelled").unwrap();
    assert_eq!(record.end_count(), 0);
}

#[test]
fn notifications_from_foreign_threads_reenter_the_scope() {
    let tracer = TestTracer::new();
    let traced = TracedSource::new(
        ThreadedSource::new(ValuesSource::new(vec!["a", "b"])),
        tracer.clone(),
        SpanBuilder::from_name("hopping"),
    );
    let (subscriber, log) = RecordingSubscriber::new();
    Box::new(traced).subscribe(Box::new(subscriber));

    let record = tracer.span_named("hopping").unwrap();
    assert_eq!(log.values(), vec!["a", "b"]);
    // Each notification ran on a fresh thread with an empty ambient context,
    // and still observed the span.
    for span_context in log.span_contexts() {
        assert_eq!(&span_context, record.span_context());
    }
    assert_eq!(record.end_count(), 1);
}

#[test]
fn subscribe_restores_the_ambient_context() {
    #[derive(Debug, PartialEq)]
    struct Marker(&'static str);

    let tracer = TestTracer::new();
    let _ambient = Context::new().with_value(Marker("ambient")).attach();

    let traced = TracedSource::new(
        ValuesSource::single(1u32),
        tracer,
        SpanBuilder::from_name("scoped"),
    );
    let (subscriber, _log) = RecordingSubscriber::new();
    Box::new(traced).subscribe(Box::new(subscriber));

    // Whatever subscribe activated internally is gone again.
    assert!(!Context::map_current(|cx| cx.has_active_span()));
    assert_eq!(Context::current().get::<Marker>(), Some(&Marker("ambient")));
}

#[test]
fn new_span_is_parented_on_the_context_captured_at_construction() {
    let tracer = TestTracer::new();
    let parent = tracer.start("parent");
    let parent_id = parent.span_context().span_id();

    let traced = {
        let _guard = mark_span_as_active(parent);
        // Parent context captured here, at construction...
        TracedSource::new(
            ValuesSource::single("ok"),
            tracer.clone(),
            SpanBuilder::from_name("child"),
        )
    };

    // ...so subscribing outside the parent's scope still chains the spans.
    let (subscriber, _log) = RecordingSubscriber::new();
    Box::new(traced).subscribe(Box::new(subscriber));

    let child = tracer.span_named("child").unwrap();
    assert_eq!(child.parent_span_id(), parent_id);
    assert_eq!(child.end_count(), 1);
}

#[test]
fn observer_hooks_tag_the_span() {
    struct HttpObserver;

    impl StreamObserver<u16> for HttpObserver {
        fn on_subscribe(&self, span: &SpanRef<'_>) {
            span.set_attribute(KeyValue::new("peer.service", "backend"));
        }

        fn on_next(&self, status: &u16, span: &SpanRef<'_>) {
            span.set_attribute(KeyValue::new("http.status_code", *status as i64));
        }

        fn on_error(&self, error: &(dyn Error + 'static), span: &SpanRef<'_>) {
            span.set_status(Status::error(error.to_string()));
        }
    }

    let tracer = TestTracer::new();
    let traced = TracedSource::new(
        ValuesSource::single(200u16),
        tracer.clone(),
        SpanBuilder::from_name("http_ok"),
    )
    .with_observer(HttpObserver);
    let (subscriber, _log) = RecordingSubscriber::new();
    Box::new(traced).subscribe(Box::new(subscriber));

    let record = tracer.span_named("http_ok").unwrap();
    assert!(record.attribute("peer.service").is_some());
    assert_eq!(
        record.attribute("http.status_code"),
        Some(KeyValue::new("http.status_code", 200i64))
    );

    let traced = TracedSource::new(
        ValuesSource::<u16>::failing(TestError::new("503")),
        tracer.clone(),
        SpanBuilder::from_name("http_err"),
    )
    .with_observer(HttpObserver);
    let (subscriber, _log) = RecordingSubscriber::new();
    Box::new(traced).subscribe(Box::new(subscriber));

    let record = tracer.span_named("http_err").unwrap();
    assert_eq!(record.status(), Status::error("503"));
}

#[test]
fn nested_body_observes_the_original_span_context() {
    struct Payload {
        body: Option<Box<dyn Source<String>>>,
    }

    impl CarryContext for Payload {
        fn carry_context(self, cx: &Context) -> Self {
            Payload {
                body: self.body.map(|body| {
                    Box::new(ScopedSource::new(body, cx.clone())) as Box<dyn Source<String>>
                }),
            }
        }
    }

    struct BodyGrabber {
        stash: Arc<Mutex<Option<Box<dyn Source<String>>>>>,
    }

    impl Subscriber<Payload> for BodyGrabber {
        fn on_subscribe(&mut self, _subscription: Box<dyn Subscription>) {}

        fn on_next(&mut self, mut value: Payload) {
            *self.stash.lock().unwrap() = value.body.take();
        }

        fn on_error(&mut self, _error: BoxError) {}

        fn on_complete(&mut self) {}
    }

    let tracer = TestTracer::new();
    let payload = Payload {
        body: Some(Box::new(ValuesSource::new(vec![
            "chunk-1".to_string(),
            "chunk-2".to_string(),
        ]))),
    };
    let traced = TracedSource::new(
        ValuesSource::single(payload),
        tracer.clone(),
        SpanBuilder::from_name("request"),
    );

    let stash = Arc::new(Mutex::new(None));
    Box::new(traced).subscribe(Box::new(BodyGrabber {
        stash: stash.clone(),
    }));

    // The outer stream is done and nothing is active anymore.
    assert!(!Context::map_current(|cx| cx.has_active_span()));

    // Consuming the body later, from a scope of its own, still observes the
    // span of the request that produced it.
    let body = stash.lock().unwrap().take().expect("payload carried a body");
    let (subscriber, log) = RecordingSubscriber::new();
    Box::new(body).subscribe(Box::new(subscriber));

    let record = tracer.span_named("request").unwrap();
    assert_eq!(log.values(), vec!["chunk-1", "chunk-2"]);
    for span_context in log.span_contexts() {
        assert_eq!(&span_context, record.span_context());
    }
}

#[test]
fn traced_source_reports_its_cardinality() {
    let tracer = TestTracer::new();
    let traced = TracedSource::new(
        ValuesSource::single(1u32),
        tracer.clone(),
        SpanBuilder::from_name("probe"),
    );
    assert!(traced.single_valued());

    let overridden = TracedSource::new(
        ValuesSource::new(vec![1u32]),
        tracer,
        SpanBuilder::from_name("probe"),
    )
    .with_single_valued(true);
    assert!(overridden.single_valued());
}
