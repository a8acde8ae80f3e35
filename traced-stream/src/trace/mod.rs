//! API for describing traced units of work.
//!
//! This module holds the capability contracts the stream wrappers in
//! [`crate::stream`] are written against:
//!
//! * [`Tracer`]s create [`Span`]s from a name or a [`SpanBuilder`]
//!   descriptor, deriving the parent from a supplied [`Context`].
//! * [`Span`]s represent one traced operation: they accumulate attributes and
//!   events while running, and are terminated exactly once via [`Span::end`].
//! * [`TraceContextExt`] binds a span into a [`Context`] so that it can be
//!   made the active span of an execution scope and recovered on the far side
//!   of an asynchronous hop.
//!
//! ## Managing active spans
//!
//! The active span for a thread can be managed via [`get_active_span`] and
//! [`mark_span_as_active`].
//!
//! ```
//! use traced_stream::trace::{self, noop::NoopTracer, Tracer};
//!
//! // Get a tracer
//! let tracer = NoopTracer::new();
//!
//! // Create a span
//! let span = tracer.start("parent_span");
//!
//! // Mark the span as active
//! let active = trace::mark_span_as_active(span);
//!
//! // Any span created here will be a child of `parent_span`...
//!
//! // Drop the guard and the span will no longer be active
//! drop(active)
//! ```
//!
//! [`Context`]: crate::Context

use std::borrow::Cow;
use thiserror::Error;

pub(crate) mod context;
pub mod noop;
mod span;
mod span_context;
mod tracer;

pub use self::{
    context::{get_active_span, mark_span_as_active, SpanRef, TraceContextExt},
    noop::{NoopSpan, NoopTracer},
    span::{BoxedSpan, ObjectSafeSpan, Span, SpanKind, Status},
    span_context::{SpanContext, SpanId, TraceId},
    tracer::{BoxedTracer, ObjectSafeTracer, SpanBuilder, Tracer},
};

/// Describe the result of operations in the tracing API.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors returned by the trace API.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// Other errors not covered by more specific variants.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl From<String> for TraceError {
    fn from(err_msg: String) -> Self {
        TraceError::Other(Box::new(Custom(err_msg.into())))
    }
}

impl From<&'static str> for TraceError {
    fn from(err_msg: &'static str) -> Self {
        TraceError::Other(Box::new(Custom(err_msg.into())))
    }
}

/// Wrap type for string
#[derive(Error, Debug)]
#[error("{0}")]
struct Custom(Cow<'static, str>);
