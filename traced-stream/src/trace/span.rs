use crate::{trace::SpanContext, KeyValue};
use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::time::SystemTime;

/// The interface for a single traced operation.
///
/// Spans can be nested to form a trace tree. The span `name` concisely
/// identifies the class of work represented by the span (an RPC method name, a
/// stream stage, the name of a subtask), rather than an individual instance of
/// it.
///
/// The span's start and end timestamps reflect the elapsed real time of the
/// operation. A span is terminated exactly once via [`end`]; implementations
/// must tolerate repeated `end` calls, but well-behaved callers (including the
/// stream wrappers in this crate) never issue more than one.
///
/// [`end`]: Span::end
pub trait Span {
    /// Record an event in the context of this span.
    fn add_event<T>(&mut self, name: T, attributes: Vec<KeyValue>)
    where
        T: Into<Cow<'static, str>>,
    {
        self.add_event_with_timestamp(name, SystemTime::now(), attributes)
    }

    /// Record an error as an event for this span.
    ///
    /// The error is stored as an `exception` event carrying the error's
    /// display representation. This does not change the span status; call
    /// [`Span::set_status`] separately if the span should be marked failed.
    ///
    /// If this span is not being recorded then this method does nothing.
    fn record_error(&mut self, err: &dyn Error) {
        if self.is_recording() {
            let attributes = vec![KeyValue::new("exception.message", err.to_string())];
            self.add_event("exception", attributes);
        }
    }

    /// Record an event with a timestamp in the context of this span.
    fn add_event_with_timestamp<T>(
        &mut self,
        name: T,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) where
        T: Into<Cow<'static, str>>;

    /// A reference to the [`SpanContext`] for this span.
    fn span_context(&self) -> &SpanContext;

    /// Returns `true` if this span is recording information.
    ///
    /// Spans stop recording after they have ended.
    fn is_recording(&self) -> bool;

    /// Set an attribute of this span.
    ///
    /// Setting an attribute with the same key as an existing attribute
    /// overwrites the existing attribute's value.
    fn set_attribute(&mut self, attribute: KeyValue);

    /// Sets the status of this span.
    ///
    /// If used, this overrides the default span status, [`Status::Unset`].
    fn set_status(&mut self, status: Status);

    /// Signals that the operation described by this span has now ended.
    fn end(&mut self) {
        self.end_with_timestamp(SystemTime::now());
    }

    /// Signals that the operation described by this span ended at the given time.
    fn end_with_timestamp(&mut self, timestamp: SystemTime);
}

/// `SpanKind` describes the relationship between a [`Span`], its parents, and
/// its children in a trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpanKind {
    /// The span describes a request to some remote service.
    Client,

    /// The span covers the server-side handling of a request.
    Server,

    /// The span describes the initiator of an asynchronous stream of work,
    /// which may end before its consumers start.
    Producer,

    /// The span describes a consumer of an asynchronous stream of work.
    Consumer,

    /// Default value.
    ///
    /// The span represents an internal operation within an application.
    Internal,
}

/// The status of a [`Span`].
///
/// These values form a total order: Ok > Error > Unset. Setting
/// `Status::Ok` overrides any prior or later attempt to set `Status::Error`
/// or `Status::Unset`.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd)]
pub enum Status {
    /// The default status.
    #[default]
    Unset,

    /// The operation contains an error.
    Error {
        /// The description of the error.
        description: Cow<'static, str>,
    },

    /// The operation has been explicitly marked successful.
    Ok,
}

impl Status {
    /// Create a new error status with a given description.
    ///
    /// # Examples
    ///
    /// ```
    /// use traced_stream::trace::Status;
    ///
    /// let error_status = Status::error("something went wrong");
    /// # drop(error_status);
    /// ```
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }
}

/// An object-safe subset of [`Span`], allowing spans of unknown concrete type
/// to be held behind a pointer.
pub trait ObjectSafeSpan {
    /// Record an event with a timestamp in the context of this span.
    fn add_event_with_timestamp(
        &mut self,
        name: Cow<'static, str>,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    );

    /// A reference to the [`SpanContext`] for this span.
    fn span_context(&self) -> &SpanContext;

    /// Returns `true` if this span is recording information.
    fn is_recording(&self) -> bool;

    /// Set an attribute of this span.
    fn set_attribute(&mut self, attribute: KeyValue);

    /// Sets the status of this span.
    fn set_status(&mut self, status: Status);

    /// Signals that the operation described by this span has now ended.
    fn end(&mut self) {
        self.end_with_timestamp(SystemTime::now());
    }

    /// Signals that the operation described by this span ended at the given time.
    fn end_with_timestamp(&mut self, timestamp: SystemTime);
}

impl<T: Span> ObjectSafeSpan for T {
    fn add_event_with_timestamp(
        &mut self,
        name: Cow<'static, str>,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) {
        self.add_event_with_timestamp(name, timestamp, attributes)
    }

    fn span_context(&self) -> &SpanContext {
        self.span_context()
    }

    fn is_recording(&self) -> bool {
        self.is_recording()
    }

    fn set_attribute(&mut self, attribute: KeyValue) {
        self.set_attribute(attribute)
    }

    fn set_status(&mut self, status: Status) {
        self.set_status(status)
    }

    fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        self.end_with_timestamp(timestamp)
    }
}

/// Wraps a [`Span`] of unknown concrete type.
pub struct BoxedSpan(Box<dyn ObjectSafeSpan + Send + Sync>);

impl BoxedSpan {
    pub(crate) fn new<T>(span: T) -> Self
    where
        T: ObjectSafeSpan + Send + Sync + 'static,
    {
        BoxedSpan(Box::new(span))
    }
}

impl fmt::Debug for BoxedSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoxedSpan")
    }
}

impl Span for BoxedSpan {
    fn add_event_with_timestamp<T>(
        &mut self,
        name: T,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) where
        T: Into<Cow<'static, str>>,
    {
        self.0
            .add_event_with_timestamp(name.into(), timestamp, attributes)
    }

    fn span_context(&self) -> &SpanContext {
        self.0.span_context()
    }

    fn is_recording(&self) -> bool {
        self.0.is_recording()
    }

    fn set_attribute(&mut self, attribute: KeyValue) {
        self.0.set_attribute(attribute)
    }

    fn set_status(&mut self, status: Status) {
        self.0.set_status(status)
    }

    fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        self.0.end_with_timestamp(timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_order() {
        assert!(Status::Ok > Status::error(""));
        assert!(Status::error("") > Status::Unset);
    }
}
