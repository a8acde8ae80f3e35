use crate::trace::SpanRef;
use std::error::Error;

/// Hooks invoked at each lifecycle point of a traced stream.
///
/// Observers attach protocol-specific knowledge (HTTP status tags, error
/// classification, peer names) to the span that wraps a stream, without
/// re-implementing any of the propagation or termination logic. All hooks
/// default to no-ops; the policy probes default to the common case (spans are
/// owned rather than continued, and errors finish the span).
///
/// Hooks run inside the stream's activated context, before the notification
/// is forwarded downstream. They must not panic on non-terminal
/// notifications; see [`TracedSource`] for the exact guarantees when they do.
///
/// [`TracedSource`]: crate::stream::TracedSource
pub trait StreamObserver<T> {
    /// Whether a continued span should be finished by this stream when it
    /// terminates.
    ///
    /// Only consulted in continue-mode, where the stream operates on a span
    /// it did not create. Returning `true` extends span ownership to this
    /// stream, for when an error forces early termination of the chain the
    /// span was meant to cover.
    fn is_continued(&self) -> bool {
        false
    }

    /// Whether an owned span is finished when the stream fails.
    ///
    /// Returning `false` leaves the span open on error, for callers that
    /// retry and want the span to cover all attempts.
    fn finish_on_error(&self) -> bool {
        true
    }

    /// Called when the stream is subscribed, before `on_subscribe` is
    /// forwarded.
    fn on_subscribe(&self, _span: &SpanRef<'_>) {}

    /// Called for each value, before it is forwarded.
    fn on_next(&self, _value: &T, _span: &SpanRef<'_>) {}

    /// Called when the stream fails, after the error is recorded on the span
    /// and before it is forwarded.
    fn on_error(&self, _error: &(dyn Error + 'static), _span: &SpanRef<'_>) {}

    /// Called when the stream completes, after `on_complete` is forwarded.
    fn on_finish(&self, _span: &SpanRef<'_>) {}
}

/// A [`StreamObserver`] with all hooks left at their defaults.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl<T> StreamObserver<T> for NoopObserver {}
