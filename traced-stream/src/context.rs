use crate::trace::context::SynchronizedSpan;
use futures_core::stream::Stream;
use pin_project_lite::pin_project;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::{BuildHasherDefault, Hasher};
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

thread_local! {
    static CURRENT_CONTEXT: RefCell<Context> = RefCell::new(Context::default());
}

/// An execution-scoped collection of ambient values.
///
/// A [`Context`] carries the currently traced span plus any other
/// execution-scoped values across API boundaries and between logically
/// associated units of work. It is the mechanism by which a span stays
/// observable on the far side of an asynchronous hop: the context is captured
/// where the span is created and re-activated wherever control re-enters user
/// code.
///
/// [`Context`]s are immutable; write operations return a new context holding
/// the previous values plus the new one.
///
/// ## Managing the current context
///
/// A context becomes the caller's current context via [`attach`], which
/// returns a [`ContextGuard`]. Dropping the guard restores whatever context
/// was current before, so activations nest and unwind correctly even on panic
/// paths. A snapshot of the current context is taken with
/// [`Context::current`].
///
/// [`attach`]: Context::attach()
///
/// # Examples
///
/// ```
/// use traced_stream::Context;
///
/// // Application-specific ambient values
/// #[derive(Debug, PartialEq)]
/// struct RequestId(u64);
/// #[derive(Debug, PartialEq)]
/// struct Peer(&'static str);
///
/// let _outer = Context::new().with_value(RequestId(7)).attach();
///
/// // Only the request id is set
/// let current = Context::current();
/// assert_eq!(current.get::<RequestId>(), Some(&RequestId(7)));
/// assert_eq!(current.get::<Peer>(), None);
///
/// {
///     let _inner = Context::current_with_value(Peer("upstream")).attach();
///     // Both values visible in the inner scope
///     let current = Context::current();
///     assert_eq!(current.get::<RequestId>(), Some(&RequestId(7)));
///     assert_eq!(current.get::<Peer>(), Some(&Peer("upstream")));
/// }
///
/// // Back to just the request id once the inner guard drops
/// let current = Context::current();
/// assert_eq!(current.get::<RequestId>(), Some(&RequestId(7)));
/// assert_eq!(current.get::<Peer>(), None);
/// ```
#[derive(Clone, Default)]
pub struct Context {
    pub(crate) span: Option<Arc<SynchronizedSpan>>,
    entries: HashMap<TypeId, Arc<dyn Any + Sync + Send>, BuildHasherDefault<IdHasher>>,
}

impl Context {
    /// Creates an empty `Context`.
    pub fn new() -> Self {
        Context::default()
    }

    /// Returns an immutable snapshot of the current thread's context.
    pub fn current() -> Self {
        Context::map_current(|cx| cx.clone())
    }

    /// Applies a function to the current context, returning its value.
    ///
    /// This avoids the clone that [`Context::current`] performs when only a
    /// read of the current context is needed.
    ///
    /// Note: this will panic if another context is attached while the current
    /// one is still borrowed.
    pub fn map_current<T>(f: impl FnOnce(&Context) -> T) -> T {
        CURRENT_CONTEXT.with(|cx| f(&cx.borrow()))
    }

    /// Returns a clone of the current thread's context with the given value.
    ///
    /// This is a more efficient form of `Context::current().with_value(value)`
    /// as it avoids the intermediate context clone.
    pub fn current_with_value<T: 'static + Send + Sync>(value: T) -> Self {
        let mut new_context = Context::current();
        new_context
            .entries
            .insert(TypeId::of::<T>(), Arc::new(value));

        new_context
    }

    /// Returns a reference to the entry for the corresponding value type.
    ///
    /// # Examples
    ///
    /// ```
    /// use traced_stream::Context;
    ///
    /// #[derive(Debug, PartialEq)]
    /// struct Tenant(&'static str);
    ///
    /// let cx = Context::new().with_value(Tenant("edge"));
    /// assert_eq!(cx.get::<Tenant>(), Some(&Tenant("edge")));
    /// assert_eq!(cx.get::<u64>(), None);
    /// ```
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|rc| rc.downcast_ref())
    }

    /// Returns a copy of the context with the new value included.
    pub fn with_value<T: 'static + Send + Sync>(&self, value: T) -> Self {
        let mut new_context = self.clone();
        new_context
            .entries
            .insert(TypeId::of::<T>(), Arc::new(value));

        new_context
    }

    /// Replaces the current context on this thread with this context.
    ///
    /// Dropping the returned [`ContextGuard`] resets the current context to
    /// the previous value, on every exit path including unwinding.
    ///
    /// # Examples
    ///
    /// ```
    /// use traced_stream::Context;
    ///
    /// #[derive(Debug, PartialEq)]
    /// struct RequestId(u64);
    ///
    /// let my_cx = Context::new().with_value(RequestId(7));
    ///
    /// // NOTE: binding to `_` rather than a named variable would drop the
    /// // guard, restoring the previous context immediately.
    /// let cx_guard = my_cx.attach();
    /// assert_eq!(Context::current().get::<RequestId>(), Some(&RequestId(7)));
    ///
    /// drop(cx_guard);
    /// assert_eq!(Context::current().get::<RequestId>(), None);
    /// ```
    pub fn attach(self) -> ContextGuard {
        let previous_cx = CURRENT_CONTEXT
            .try_with(|current| current.replace(self))
            .ok();

        ContextGuard {
            previous_cx,
            _marker: PhantomData,
        }
    }

    pub(crate) fn current_with_synchronized_span(value: SynchronizedSpan) -> Self {
        Context {
            span: Some(Arc::new(value)),
            entries: Context::map_current(|cx| cx.entries.clone()),
        }
    }

    pub(crate) fn with_synchronized_span(&self, value: SynchronizedSpan) -> Self {
        Context {
            span: Some(Arc::new(value)),
            entries: self.entries.clone(),
        }
    }

    /// Whether both contexts are bound to the same span instance.
    ///
    /// Used to skip redundant re-activation when a context is already
    /// current. Contexts without a span binding never compare equal.
    pub(crate) fn same_span(&self, other: &Context) -> bool {
        match (self.span.as_ref(), other.span.as_ref()) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("entries", &self.entries.len())
            .field("has_span", &self.span.is_some())
            .finish()
    }
}

pin_project! {
    /// A future or stream that re-activates an associated context at each poll.
    #[derive(Clone, Debug)]
    pub struct WithContext<T> {
        #[pin]
        inner: T,
        cx: Context,
    }
}

impl<T: Sized> FutureExt for T {}

impl<T: Future> Future for WithContext<T> {
    type Output = T::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.cx.clone().attach();

        this.inner.poll(task_cx)
    }
}

impl<T: Stream> Stream for WithContext<T> {
    type Item = T::Item;

    fn poll_next(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let _guard = this.cx.clone().attach();
        T::poll_next(this.inner, task_cx)
    }
}

/// Extension trait allowing futures and streams to carry an ambient context.
///
/// The attached context is set as current for each individual poll, not for
/// the lifetime of the wrapped value: asynchronous executors are free to move
/// the value between threads, and each resumption re-enters the scope
/// independently.
pub trait FutureExt: Sized {
    /// Attaches the provided [`Context`] to this type, returning a
    /// [`WithContext`] wrapper.
    fn with_context(self, cx: Context) -> WithContext<Self> {
        WithContext { inner: self, cx }
    }

    /// Attaches the current [`Context`] to this type, returning a
    /// [`WithContext`] wrapper.
    fn with_current_context(self) -> WithContext<Self> {
        let cx = Context::current();
        self.with_context(cx)
    }
}

/// A guard that resets the current context to the prior context when dropped.
#[allow(missing_debug_implementations)]
pub struct ContextGuard {
    previous_cx: Option<Context>,
    // ensure this type is !Send as it relies on thread locals
    _marker: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(previous_cx) = self.previous_cx.take() {
            let _ = CURRENT_CONTEXT.try_with(|current| current.replace(previous_cx));
        }
    }
}

/// With TypeIds as keys, there's no need to hash them. They are already hashes
/// themselves, coming from the compiler. The IdHasher holds the u64 of
/// the TypeId, and then returns it, instead of doing any bit fiddling.
#[derive(Clone, Default, Debug)]
struct IdHasher(u64);

impl Hasher for IdHasher {
    fn write(&mut self, _: &[u8]) {
        unreachable!("TypeId calls write_u64");
    }

    #[inline]
    fn write_u64(&mut self, id: u64) {
        self.0 = id;
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream::StreamExt;

    #[test]
    fn nested_contexts() {
        #[derive(Debug, PartialEq)]
        struct ValueA(&'static str);
        #[derive(Debug, PartialEq)]
        struct ValueB(u64);
        let _outer_guard = Context::new().with_value(ValueA("a")).attach();

        // Only value `a` is set
        let current = Context::current();
        assert_eq!(current.get(), Some(&ValueA("a")));
        assert_eq!(current.get::<ValueB>(), None);

        {
            let _inner_guard = Context::current_with_value(ValueB(42)).attach();
            // Both values are set in inner context
            let current = Context::current();
            assert_eq!(current.get(), Some(&ValueA("a")));
            assert_eq!(current.get(), Some(&ValueB(42)));
        }

        // Resets to only value `a` when inner guard is dropped
        let current = Context::current();
        assert_eq!(current.get(), Some(&ValueA("a")));
        assert_eq!(current.get::<ValueB>(), None);
    }

    #[test]
    fn context_restored_on_panic() {
        #[derive(Debug, PartialEq)]
        struct Marker(&'static str);

        let _base = Context::new().with_value(Marker("base")).attach();
        let result = std::panic::catch_unwind(|| {
            let _guard = Context::current_with_value(Marker("inner")).attach();
            panic!("boom");
        });
        assert!(result.is_err());
        assert_eq!(Context::current().get::<Marker>(), Some(&Marker("base")));
    }

    #[test]
    fn same_span_requires_identical_binding() {
        use crate::trace::{NoopSpan, TraceContextExt};

        let plain = Context::new();
        assert!(!plain.same_span(&plain));

        let with_span = Context::new().with_span(NoopSpan::new());
        assert!(with_span.same_span(&with_span.clone()));

        let other = Context::new().with_span(NoopSpan::new());
        assert!(!with_span.same_span(&other));
    }

    #[test]
    fn future_polled_within_attached_context() {
        #[derive(Debug, PartialEq)]
        struct Flag(bool);

        let cx = Context::new().with_value(Flag(true));
        let fut = async {
            Context::map_current(|cx| assert_eq!(cx.get::<Flag>(), Some(&Flag(true))));
        };
        futures_executor::block_on(fut.with_context(cx));

        // The future's context does not leak into the caller.
        assert_eq!(Context::current().get::<Flag>(), None);
    }

    #[test]
    fn stream_polled_within_attached_context() {
        #[derive(Debug, PartialEq)]
        struct Flag(u32);

        let cx = Context::new().with_value(Flag(3));
        let seen = futures_executor::block_on(
            futures_util::stream::iter(vec![1u32, 2, 3])
                .map(|n| {
                    Context::map_current(|cx| assert_eq!(cx.get::<Flag>(), Some(&Flag(3))));
                    n
                })
                .with_context(cx)
                .collect::<Vec<_>>(),
        );
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
