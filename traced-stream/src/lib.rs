//! Span-scoped context propagation for push-based value streams.
//!
//! Asynchronous, push-based pipelines break the call-stack-scoped lifetime
//! that ambient tracing context relies on: a thread-local "current span" set
//! at function entry and restored at exit does not survive a hop between
//! threads or event-loop resumptions. This crate re-inserts that scope at
//! every point control re-enters user code, and binds a span's lifecycle to a
//! stream's lifecycle: started at subscribe, annotated along the way, and
//! finished exactly once at the stream's terminal notification.
//!
//! # Overview
//!
//! * [`Context`] is the ambient carrier: an immutable snapshot of the current
//!   span plus other execution-scoped values, activated for a scope via
//!   [`Context::attach`] and restored when the returned guard drops.
//! * [`trace`] holds the span vocabulary: the [`Span`] and [`Tracer`]
//!   capability traits, the [`SpanBuilder`] descriptor, and no-op
//!   implementations.
//! * [`stream`] holds the push-based stream contracts and the wrappers that
//!   do the actual work: [`TracedSource`] for span-owning streams and
//!   [`ScopedSource`] for propagation-only rebinding of nested payloads.
//!
//! Rust-native futures and streams can carry a context too, via
//! [`FutureExt::with_context`], which re-enters the scope at every poll.
//!
//! # Getting started
//!
//! ```
//! use traced_stream::trace::{noop::NoopTracer, TraceContextExt, Tracer};
//! use traced_stream::Context;
//!
//! fn do_work(tracer: &NoopTracer) {
//!     let _guard = Context::current_with_span(tracer.start("my_span")).attach();
//!     // work here sees `my_span` as the active span
//! }
//! # do_work(&NoopTracer::new());
//! ```
//!
//! See the [`stream`] module docs for wrapping a push-based source.
//!
//! [`Span`]: crate::trace::Span
//! [`Tracer`]: crate::trace::Tracer
//! [`SpanBuilder`]: crate::trace::SpanBuilder
//! [`TracedSource`]: crate::stream::TracedSource
//! [`ScopedSource`]: crate::stream::ScopedSource
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(
    docsrs,
    feature(doc_cfg, doc_auto_cfg),
    deny(rustdoc::broken_intra_doc_links)
)]

mod common;

pub use common::{Key, KeyValue, StringValue, Value};

mod context;

pub use context::{Context, ContextGuard, FutureExt, WithContext};

mod internal_logging;

pub mod stream;

pub mod trace;

#[cfg(any(feature = "testing", test))]
pub mod testing;

#[cfg(feature = "internal-logs")]
#[doc(hidden)]
pub mod _private {
    pub use tracing::{debug, warn};
}
