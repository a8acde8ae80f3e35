//! Recording tracer and span for assertions on span lifecycles.

use crate::trace::{
    Span, SpanBuilder, SpanContext, SpanId, SpanKind, Status, TraceContextExt, TraceId, Tracer,
};
use crate::{Context, KeyValue};
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// A [`Tracer`] that records every span it starts.
///
/// Each started span registers an [`SpanRecord`] with the tracer, shared via
/// `Arc`, so tests can assert on names, parentage, attributes, events, and,
/// most importantly, how many times each span was ended.
#[derive(Clone, Debug, Default)]
pub struct TestTracer(Arc<TracerState>);

#[derive(Debug, Default)]
struct TracerState {
    spans: Mutex<Vec<Arc<SpanRecord>>>,
    next_id: AtomicU64,
}

impl TestTracer {
    /// Create a new recording tracer.
    pub fn new() -> Self {
        TestTracer::default()
    }

    /// All spans started by this tracer, in start order.
    pub fn spans(&self) -> Vec<Arc<SpanRecord>> {
        self.0.spans.lock().unwrap().clone()
    }

    /// Number of spans started by this tracer.
    pub fn started_count(&self) -> usize {
        self.0.spans.lock().unwrap().len()
    }

    /// Number of spans that have been ended at least once.
    pub fn finished_count(&self) -> usize {
        self.0
            .spans
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.end_count() > 0)
            .count()
    }

    /// The record of the first span started with the given name.
    pub fn span_named(&self, name: &str) -> Option<Arc<SpanRecord>> {
        self.0
            .spans
            .lock()
            .unwrap()
            .iter()
            .find(|record| record.name() == name)
            .cloned()
    }
}

impl Tracer for TestTracer {
    type Span = TestSpan;

    fn build_with_context(&self, builder: SpanBuilder, parent_cx: &Context) -> Self::Span {
        let id = self.0.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (trace_id, parent_span_id) = if parent_cx.has_active_span() {
            let parent = parent_cx.span().span_context().clone();
            (parent.trace_id(), parent.span_id())
        } else {
            (TraceId::from_u128(id as u128), SpanId::INVALID)
        };

        let record = Arc::new(SpanRecord {
            name: builder.name,
            span_kind: builder.span_kind,
            span_context: SpanContext::new(trace_id, SpanId::from_u64(id)),
            parent_span_id,
            attributes: Mutex::new(builder.attributes.unwrap_or_default()),
            events: Mutex::new(Vec::new()),
            status: Mutex::new(Status::Unset),
            end_calls: AtomicUsize::new(0),
        });
        self.0.spans.lock().unwrap().push(record.clone());

        TestSpan { record }
    }
}

/// The observable state of one span started by a [`TestTracer`].
#[derive(Debug)]
pub struct SpanRecord {
    name: Cow<'static, str>,
    span_kind: Option<SpanKind>,
    span_context: SpanContext,
    parent_span_id: SpanId,
    attributes: Mutex<Vec<KeyValue>>,
    events: Mutex<Vec<(String, Vec<KeyValue>)>>,
    status: Mutex<Status>,
    end_calls: AtomicUsize,
}

impl SpanRecord {
    /// The span's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The span's kind, if one was set on the builder.
    pub fn span_kind(&self) -> Option<&SpanKind> {
        self.span_kind.as_ref()
    }

    /// The span's identity.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// The id of the parent span, or [`SpanId::INVALID`] for a root span.
    pub fn parent_span_id(&self) -> SpanId {
        self.parent_span_id
    }

    /// How many times the span has been ended.
    pub fn end_count(&self) -> usize {
        self.end_calls.load(Ordering::SeqCst)
    }

    /// The span's attributes, builder-supplied ones included.
    pub fn attributes(&self) -> Vec<KeyValue> {
        self.attributes.lock().unwrap().clone()
    }

    /// The attribute with the given key, if set.
    pub fn attribute(&self, key: &str) -> Option<KeyValue> {
        self.attributes
            .lock()
            .unwrap()
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .cloned()
    }

    /// Recorded events as `(name, attributes)` pairs.
    pub fn events(&self) -> Vec<(String, Vec<KeyValue>)> {
        self.events.lock().unwrap().clone()
    }

    /// Names of the recorded events, in order.
    pub fn event_names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The span's status.
    pub fn status(&self) -> Status {
        self.status.lock().unwrap().clone()
    }
}

/// A [`Span`] recording its mutations into a shared [`SpanRecord`].
#[derive(Debug)]
pub struct TestSpan {
    record: Arc<SpanRecord>,
}

impl TestSpan {
    /// Create a detached span with the given identity.
    ///
    /// The span records into its own [`SpanRecord`] not registered with any
    /// tracer; useful for seeding a context with a known span identity.
    pub fn with_span_context(span_context: SpanContext) -> Self {
        TestSpan {
            record: Arc::new(SpanRecord {
                name: Cow::Borrowed("detached"),
                span_kind: None,
                span_context,
                parent_span_id: SpanId::INVALID,
                attributes: Mutex::new(Vec::new()),
                events: Mutex::new(Vec::new()),
                status: Mutex::new(Status::Unset),
                end_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// The record this span mutates.
    pub fn record(&self) -> Arc<SpanRecord> {
        self.record.clone()
    }
}

impl Span for TestSpan {
    fn add_event_with_timestamp<T>(
        &mut self,
        name: T,
        _timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) where
        T: Into<Cow<'static, str>>,
    {
        if self.is_recording() {
            self.record
                .events
                .lock()
                .unwrap()
                .push((name.into().into_owned(), attributes));
        }
    }

    fn span_context(&self) -> &SpanContext {
        &self.record.span_context
    }

    fn is_recording(&self) -> bool {
        self.record.end_count() == 0
    }

    fn set_attribute(&mut self, attribute: KeyValue) {
        if self.is_recording() {
            let mut attributes = self.record.attributes.lock().unwrap();
            attributes.retain(|kv| kv.key != attribute.key);
            attributes.push(attribute);
        }
    }

    fn set_status(&mut self, status: Status) {
        if self.is_recording() {
            *self.record.status.lock().unwrap() = status;
        }
    }

    fn end_with_timestamp(&mut self, _timestamp: SystemTime) {
        self.record.end_calls.fetch_add(1, Ordering::SeqCst);
    }
}
