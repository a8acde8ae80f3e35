//! Scripted sources and recording subscribers for stream assertions.

use crate::stream::{BoxError, Source, Subscriber, Subscription};
use crate::trace::{SpanContext, TraceContextExt};
use crate::Context;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Error type for scripted stream failures.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct TestError(pub String);

impl TestError {
    /// Create a new scripted error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        TestError(message.into())
    }
}

enum Terminal {
    Complete,
    Error(BoxError),
    Open,
}

/// A source that synchronously replays a scripted sequence of notifications.
///
/// On subscribe it delivers `on_subscribe` with a [`TestSubscription`], then
/// each scripted item, then the scripted terminal: completion by default, a
/// scripted error via [`failing`]/[`with_error`], or nothing at all via
/// [`hold_open`] (for cancellation tests).
///
/// [`failing`]: ValuesSource::failing
/// [`with_error`]: ValuesSource::with_error
/// [`hold_open`]: ValuesSource::hold_open
#[derive(Debug)]
pub struct ValuesSource<T> {
    items: Vec<T>,
    terminal: Terminal,
    single: bool,
    state: Arc<SubscriptionState>,
}

impl std::fmt::Debug for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Terminal::Complete => f.write_str("Complete"),
            Terminal::Error(err) => write!(f, "Error({err})"),
            Terminal::Open => f.write_str("Open"),
        }
    }
}

impl<T> ValuesSource<T> {
    /// A multi-valued source emitting `items` then completing.
    pub fn new(items: Vec<T>) -> Self {
        ValuesSource {
            items,
            terminal: Terminal::Complete,
            single: false,
            state: Arc::default(),
        }
    }

    /// A source declared single-valued, emitting `item` then completing.
    pub fn single(item: T) -> Self {
        ValuesSource {
            items: vec![item],
            terminal: Terminal::Complete,
            single: true,
            state: Arc::default(),
        }
    }

    /// A source that fails with `error` immediately after `on_subscribe`.
    pub fn failing(error: impl Into<BoxError>) -> Self {
        ValuesSource {
            items: Vec::new(),
            terminal: Terminal::Error(error.into()),
            single: false,
            state: Arc::default(),
        }
    }

    /// Replace the terminal completion with `error`.
    pub fn with_error(mut self, error: impl Into<BoxError>) -> Self {
        self.terminal = Terminal::Error(error.into());
        self
    }

    /// Never deliver a terminal notification.
    pub fn hold_open(mut self) -> Self {
        self.terminal = Terminal::Open;
        self
    }

    /// A probe sharing this source's subscription state.
    pub fn subscription(&self) -> TestSubscription {
        TestSubscription {
            state: self.state.clone(),
        }
    }
}

impl<T: Send + 'static> Source<T> for ValuesSource<T> {
    fn subscribe(mut self: Box<Self>, mut subscriber: Box<dyn Subscriber<T>>) {
        subscriber.on_subscribe(Box::new(TestSubscription {
            state: self.state.clone(),
        }));

        for value in self.items.drain(..) {
            if self.state.cancelled.load(Ordering::SeqCst) {
                return;
            }
            subscriber.on_next(value);
        }

        if self.state.cancelled.load(Ordering::SeqCst) {
            return;
        }
        match self.terminal {
            Terminal::Complete => subscriber.on_complete(),
            Terminal::Error(error) => subscriber.on_error(error),
            Terminal::Open => {}
        }
    }

    fn single_valued(&self) -> bool {
        self.single
    }
}

#[derive(Debug, Default)]
struct SubscriptionState {
    cancelled: AtomicBool,
    requested: AtomicU64,
}

/// A [`Subscription`] recording the demand and cancellation it receives.
#[derive(Clone, Debug)]
pub struct TestSubscription {
    state: Arc<SubscriptionState>,
}

impl TestSubscription {
    /// Whether `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Total demand requested so far.
    pub fn requested(&self) -> u64 {
        self.state.requested.load(Ordering::SeqCst)
    }
}

impl Subscription for TestSubscription {
    fn request(&self, n: u64) {
        self.state.requested.fetch_add(n, Ordering::SeqCst);
    }

    fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
    }
}

/// One recorded stream notification.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification<T> {
    /// The subscription was established.
    Subscribe,
    /// A value arrived.
    Next(T),
    /// The stream failed; holds the error's display representation.
    Error(String),
    /// The stream completed.
    Complete,
}

struct LogState<T> {
    notifications: Mutex<Vec<(Notification<T>, SpanContext)>>,
    errors: Mutex<Vec<BoxError>>,
    subscription: Mutex<Option<Box<dyn Subscription>>>,
}

impl<T> Default for LogState<T> {
    fn default() -> Self {
        LogState {
            notifications: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            subscription: Mutex::new(None),
        }
    }
}

/// Shared view of everything a [`RecordingSubscriber`] observed.
///
/// Each notification is stored together with the [`SpanContext`] that was
/// current on the recording thread when it arrived, which is how tests verify
/// that context propagation actually happened.
pub struct NotificationLog<T>(Arc<LogState<T>>);

impl<T> std::fmt::Debug for NotificationLog<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationLog")
            .field("len", &self.len())
            .finish()
    }
}

impl<T> Clone for NotificationLog<T> {
    fn clone(&self) -> Self {
        NotificationLog(self.0.clone())
    }
}

impl<T> NotificationLog<T> {
    /// Recorded notifications with the span context observed at each.
    pub fn entries(&self) -> Vec<(Notification<T>, SpanContext)>
    where
        T: Clone,
    {
        self.0.notifications.lock().unwrap().clone()
    }

    /// Just the recorded values, in arrival order.
    pub fn values(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.0
            .notifications
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(notification, _)| match notification {
                Notification::Next(value) => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    /// The span contexts observed at each notification, in order.
    pub fn span_contexts(&self) -> Vec<SpanContext> {
        self.0
            .notifications
            .lock()
            .unwrap()
            .iter()
            .map(|(_, span_context)| span_context.clone())
            .collect()
    }

    /// Number of recorded notifications.
    pub fn len(&self) -> usize {
        self.0.notifications.lock().unwrap().len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a completion notification was recorded.
    pub fn completed(&self) -> bool {
        self.0
            .notifications
            .lock()
            .unwrap()
            .iter()
            .any(|(notification, _)| matches!(notification, Notification::Complete))
    }

    /// Remove and return the errors received so far, as delivered.
    pub fn take_errors(&self) -> Vec<BoxError> {
        std::mem::take(&mut *self.0.errors.lock().unwrap())
    }

    /// Cancel the recorded subscription, if one was received.
    pub fn cancel(&self) -> bool {
        match &*self.0.subscription.lock().unwrap() {
            Some(subscription) => {
                subscription.cancel();
                true
            }
            None => false,
        }
    }
}

/// A terminal [`Subscriber`] recording everything it receives into a
/// [`NotificationLog`].
pub struct RecordingSubscriber<T> {
    log: NotificationLog<T>,
}

impl<T> std::fmt::Debug for RecordingSubscriber<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RecordingSubscriber")
    }
}

impl<T> RecordingSubscriber<T> {
    /// Create a recording subscriber and the log handle to observe it with.
    pub fn new() -> (Self, NotificationLog<T>) {
        let log = NotificationLog(Arc::new(LogState::default()));
        (
            RecordingSubscriber { log: log.clone() },
            log,
        )
    }

    fn record(&self, notification: Notification<T>) {
        let span_context = Context::map_current(|cx| cx.span().span_context().clone());
        self.log
            .0
            .notifications
            .lock()
            .unwrap()
            .push((notification, span_context));
    }
}

impl<T: Send + 'static> Subscriber<T> for RecordingSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Box<dyn Subscription>) {
        self.record(Notification::Subscribe);
        *self.log.0.subscription.lock().unwrap() = Some(subscription);
    }

    fn on_next(&mut self, value: T) {
        self.record(Notification::Next(value));
    }

    fn on_error(&mut self, error: BoxError) {
        self.record(Notification::Error(error.to_string()));
        self.log.0.errors.lock().unwrap().push(error);
    }

    fn on_complete(&mut self) {
        self.record(Notification::Complete);
    }
}

/// Decorates a source so every notification is delivered from a freshly
/// spawned thread.
///
/// The spawning thread joins each notification thread before returning, so
/// the serial-notification contract holds while the thread identity changes
/// on every call, exactly the shape of a pipeline hopping between workers.
pub struct ThreadedSource<T: 'static> {
    inner: Box<dyn Source<T>>,
}

impl<T> std::fmt::Debug for ThreadedSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ThreadedSource")
    }
}

impl<T> ThreadedSource<T> {
    /// Deliver `inner`'s notifications from per-notification threads.
    pub fn new<S>(inner: S) -> Self
    where
        S: Source<T> + 'static,
    {
        ThreadedSource {
            inner: Box::new(inner),
        }
    }
}

impl<T: Send + 'static> Source<T> for ThreadedSource<T> {
    fn subscribe(self: Box<Self>, subscriber: Box<dyn Subscriber<T>>) {
        let this = *self;
        this.inner.subscribe(Box::new(ThreadedSubscriber {
            downstream: subscriber,
        }));
    }

    fn single_valued(&self) -> bool {
        self.inner.single_valued()
    }
}

struct ThreadedSubscriber<T: 'static> {
    downstream: Box<dyn Subscriber<T>>,
}

impl<T: Send> Subscriber<T> for ThreadedSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Box<dyn Subscription>) {
        std::thread::scope(|scope| {
            scope.spawn(|| self.downstream.on_subscribe(subscription));
        });
    }

    fn on_next(&mut self, value: T) {
        std::thread::scope(|scope| {
            scope.spawn(|| self.downstream.on_next(value));
        });
    }

    fn on_error(&mut self, error: BoxError) {
        std::thread::scope(|scope| {
            scope.spawn(|| self.downstream.on_error(error));
        });
    }

    fn on_complete(&mut self) {
        std::thread::scope(|scope| {
            scope.spawn(|| self.downstream.on_complete());
        });
    }
}
