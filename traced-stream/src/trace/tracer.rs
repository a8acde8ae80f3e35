use crate::trace::{BoxedSpan, Span, SpanKind, TraceContextExt};
use crate::{Context, KeyValue};
use std::borrow::Cow;
use std::fmt;

/// The interface for constructing [`Span`]s.
///
/// Spans are created with a name and, through the supplied parent [`Context`],
/// a single optional parent span. Tracers that continue an externally supplied
/// trace derive the new span's parent from the context's active span; when the
/// context carries no span, a new trace root is started.
///
/// ## Usage
///
/// ```
/// use traced_stream::trace::{noop::NoopTracer, Span, Tracer};
///
/// let tracer = NoopTracer::new();
/// let mut span = tracer.start("stream_fetch");
/// // ... the traced work happens here ...
/// span.end();
/// ```
pub trait Tracer {
    /// The [`Span`] type produced by this tracer.
    type Span: Span + Send + Sync + 'static;

    /// Starts a new [`Span`].
    ///
    /// The span is a child of the currently active span, if any.
    fn start<T>(&self, name: T) -> Self::Span
    where
        T: Into<Cow<'static, str>>,
    {
        self.start_with_context(name, &Context::current())
    }

    /// Starts a new [`Span`] with the given parent context.
    fn start_with_context<T>(&self, name: T, parent_cx: &Context) -> Self::Span
    where
        T: Into<Cow<'static, str>>,
    {
        self.build_with_context(SpanBuilder::from_name(name), parent_cx)
    }

    /// Creates a span builder, usable to describe a span before starting it.
    fn span_builder<T>(&self, name: T) -> SpanBuilder
    where
        T: Into<Cow<'static, str>>,
    {
        SpanBuilder::from_name(name)
    }

    /// Create a span from a [`SpanBuilder`], parented on the current context.
    fn build(&self, builder: SpanBuilder) -> Self::Span {
        self.build_with_context(builder, &Context::current())
    }

    /// Create a span from a [`SpanBuilder`] with the given parent context.
    fn build_with_context(&self, builder: SpanBuilder, parent_cx: &Context) -> Self::Span;

    /// Start a new span and execute the given closure with it as the active
    /// span in the closure's scope.
    ///
    /// # Examples
    ///
    /// ```
    /// use traced_stream::trace::{get_active_span, noop::NoopTracer, Tracer};
    ///
    /// let tracer = NoopTracer::new();
    /// tracer.in_span("stream_fetch", |_cx| {
    ///     // spans created here would be children of `stream_fetch`
    ///     get_active_span(|span| {
    ///         let _ = span.span_context();
    ///     });
    /// });
    /// ```
    fn in_span<T, F, N>(&self, name: N, f: F) -> T
    where
        F: FnOnce(Context) -> T,
        N: Into<Cow<'static, str>>,
    {
        let span = self.start(name);
        let cx = Context::current_with_span(span);
        let _guard = cx.clone().attach();
        f(cx)
    }
}

/// A description of a [`Span`] that has not yet been started.
///
/// This is the "span descriptor" handed to stream wrappers: the name, kind,
/// and initial attributes of the span that should wrap an operation, decoupled
/// from the moment the span actually starts.
///
/// # Examples
///
/// ```
/// use traced_stream::trace::{noop::NoopTracer, SpanBuilder, SpanKind};
///
/// let tracer = NoopTracer::new();
/// let span = SpanBuilder::from_name("fetch_user")
///     .with_kind(SpanKind::Client)
///     .start(&tracer);
/// # drop(span);
/// ```
#[derive(Clone, Debug, Default)]
pub struct SpanBuilder {
    /// The span's name.
    pub name: Cow<'static, str>,

    /// The span's kind, if explicitly set.
    pub span_kind: Option<SpanKind>,

    /// Attributes the span starts with.
    pub attributes: Option<Vec<KeyValue>>,
}

impl SpanBuilder {
    /// Create a new span builder from a span name.
    pub fn from_name<T: Into<Cow<'static, str>>>(name: T) -> Self {
        SpanBuilder {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Specify the span kind.
    pub fn with_kind(self, span_kind: SpanKind) -> Self {
        SpanBuilder {
            span_kind: Some(span_kind),
            ..self
        }
    }

    /// Specify the initial attributes.
    pub fn with_attributes<I>(self, attributes: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        SpanBuilder {
            attributes: Some(attributes.into_iter().collect()),
            ..self
        }
    }

    /// Start the described span, parented on the current context.
    pub fn start<T: Tracer>(self, tracer: &T) -> T::Span {
        tracer.build_with_context(self, &Context::current())
    }

    /// Start the described span with the given parent context.
    pub fn start_with_context<T: Tracer>(self, tracer: &T, parent_cx: &Context) -> T::Span {
        tracer.build_with_context(self, parent_cx)
    }
}

/// An object-safe subset of [`Tracer`], allowing tracers of unknown concrete
/// type to be held behind a pointer.
pub trait ObjectSafeTracer {
    /// Create a boxed span from a [`SpanBuilder`] with the given parent
    /// context.
    fn build_with_context_boxed(&self, builder: SpanBuilder, parent_cx: &Context) -> BoxedSpan;
}

impl<S, T> ObjectSafeTracer for T
where
    S: Span + Send + Sync + 'static,
    T: Tracer<Span = S>,
{
    fn build_with_context_boxed(&self, builder: SpanBuilder, parent_cx: &Context) -> BoxedSpan {
        BoxedSpan::new(self.build_with_context(builder, parent_cx))
    }
}

/// Wraps a [`Tracer`] of unknown concrete type.
pub struct BoxedTracer(Box<dyn ObjectSafeTracer + Send + Sync>);

impl BoxedTracer {
    /// Create a `BoxedTracer` from the given tracer.
    pub fn new<T>(tracer: T) -> Self
    where
        T: ObjectSafeTracer + Send + Sync + 'static,
    {
        BoxedTracer(Box::new(tracer))
    }
}

impl fmt::Debug for BoxedTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoxedTracer")
    }
}

impl Tracer for BoxedTracer {
    /// Spans produced by a boxed tracer are themselves boxed.
    type Span = BoxedSpan;

    fn build_with_context(&self, builder: SpanBuilder, parent_cx: &Context) -> Self::Span {
        self.0.build_with_context_boxed(builder, parent_cx)
    }
}
