//! Span-scoped wrappers for push-based value streams.
//!
//! Push-based pipelines break the call-stack-scoped lifetime that ambient
//! context normally relies on: a thread-local set at function entry and
//! restored at exit never survives an asynchronous hop. The wrappers in this
//! module re-insert the activation at every point control re-enters user
//! code, and bind a span's start and end to the stream's subscribe and
//! terminal notifications:
//!
//! * [`TracedSource`] starts (or continues) a span for a stream and finishes
//!   an owned span exactly once at the stream's terminal point.
//! * [`ScopedSource`] only re-activates a captured [`Context`] around each
//!   notification, for nested payloads that outlive the traced operation's
//!   visible scope.
//! * [`StreamObserver`] is the extension point for protocol-specific span
//!   tagging.
//!
//! # Examples
//!
//! ```
//! use traced_stream::stream::{BoxError, Source, Subscriber, Subscription, TracedSource};
//! use traced_stream::trace::{noop::NoopTracer, SpanBuilder};
//!
//! // A one-shot source that yields a single response synchronously.
//! struct Lookup;
//!
//! impl Source<String> for Lookup {
//!     fn subscribe(self: Box<Self>, mut subscriber: Box<dyn Subscriber<String>>) {
//!         subscriber.on_next("ok".to_owned());
//!         subscriber.on_complete();
//!     }
//!
//!     fn single_valued(&self) -> bool {
//!         true
//!     }
//! }
//!
//! struct Print;
//!
//! impl Subscriber<String> for Print {
//!     fn on_subscribe(&mut self, _subscription: Box<dyn Subscription>) {}
//!     fn on_next(&mut self, value: String) {
//!         println!("got {value}");
//!     }
//!     fn on_error(&mut self, _error: BoxError) {}
//!     fn on_complete(&mut self) {}
//! }
//!
//! // The span named `lookup` starts at subscribe and ends when the single
//! // value has been delivered.
//! let traced = TracedSource::new(Lookup, NoopTracer::new(), SpanBuilder::from_name("lookup"));
//! Box::new(traced).subscribe(Box::new(Print));
//! ```
//!
//! [`Context`]: crate::Context

mod observer;
mod scoped;
mod source;
mod traced;

pub use observer::{NoopObserver, StreamObserver};
pub use scoped::ScopedSource;
pub use source::{BoxError, CarryContext, Source, Subscriber, Subscription};
pub use traced::TracedSource;
