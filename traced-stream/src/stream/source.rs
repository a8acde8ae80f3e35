use crate::Context;
use std::error::Error;

/// Errors delivered through a stream's terminal `on_error` notification.
///
/// Errors are treated as opaque values: the wrappers in this crate record
/// them onto spans and forward the very same boxed value downstream, never
/// wrapping or replacing it.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// The demand and cancellation contract between a subscriber and the source
/// it is subscribed to.
///
/// Subscriptions are handed to the subscriber in `on_subscribe` and flow from
/// the downstream consumer directly to the upstream producer; the tracing
/// wrappers forward them untouched.
pub trait Subscription: Send {
    /// Request `n` more values from the source.
    fn request(&self, n: u64);

    /// Stop the source from delivering further notifications.
    ///
    /// Cancellation is best-effort: notifications already in flight may still
    /// arrive.
    fn cancel(&self);
}

/// A consumer of the ordered notifications of a [`Source`].
///
/// Sources guarantee serial notification: no two calls on one subscriber ever
/// overlap, though successive calls may come from different threads.
/// `on_error` and `on_complete` are terminal; a well-behaved source delivers
/// exactly one of them (unless cancelled first) and nothing afterwards.
pub trait Subscriber<T>: Send {
    /// Called once, before any values, with the subscription handle.
    fn on_subscribe(&mut self, subscription: Box<dyn Subscription>);

    /// Called for each value the source produces.
    fn on_next(&mut self, value: T);

    /// Terminal notification: the source failed.
    fn on_error(&mut self, error: BoxError);

    /// Terminal notification: the source is exhausted.
    fn on_complete(&mut self);
}

/// A push-based, potentially multi-valued, cancellable producer of values.
pub trait Source<T>: Send {
    /// Begin producing values for the given subscriber.
    ///
    /// Consumes the source: each source instance backs exactly one
    /// subscription.
    fn subscribe(self: Box<Self>, subscriber: Box<dyn Subscriber<T>>);

    /// Whether this source is declared to emit at most one value.
    ///
    /// Wrappers use this as the default cardinality probe: a single-valued
    /// source's span can be finished as soon as its one value is delivered
    /// rather than waiting for a completion signal that some one-shot sources
    /// send late or not at all.
    fn single_valued(&self) -> bool {
        false
    }
}

impl<T, S: Source<T> + ?Sized> Source<T> for Box<S> {
    fn subscribe(self: Box<Self>, subscriber: Box<dyn Subscriber<T>>) {
        (*self).subscribe(subscriber)
    }

    fn single_valued(&self) -> bool {
        (**self).single_valued()
    }
}

/// Rebinds any nested asynchronous payload of a value to a given [`Context`].
///
/// When a traced stream emits a value that itself carries a deferred payload
/// (a response whose body arrives later, say), consumers of that payload run
/// outside the scope the tracing wrapper controls. Implementing this trait
/// lets such values wrap their payload, typically in a [`ScopedSource`], so
/// its notifications still observe the original trace context. Plain values
/// use the default identity implementation:
///
/// ```
/// use traced_stream::stream::CarryContext;
///
/// struct Ticket(u32);
///
/// impl CarryContext for Ticket {}
/// ```
///
/// [`ScopedSource`]: crate::stream::ScopedSource
pub trait CarryContext {
    /// Returns this value with any nested payload bound to `cx`.
    fn carry_context(self, cx: &Context) -> Self
    where
        Self: Sized,
    {
        let _ = cx;
        self
    }
}

macro_rules! carry_context_by_value {
    ($($t:ty),+ $(,)?) => {
        $(
            impl CarryContext for $t {}
        )+
    }
}

carry_context_by_value!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    usize,
    isize,
    f32,
    f64,
    String,
    &'static str,
    Vec<u8>,
);

impl<T: CarryContext> CarryContext for Option<T> {
    fn carry_context(self, cx: &Context) -> Self {
        self.map(|value| value.carry_context(cx))
    }
}
