//! The configuration handle: lock-free snapshot reads plus change streams.

use super::builder::StackedConfigBuilder;
use crate::copy::deep_copy;
use crate::error::{Result, StackError};
use crate::notify::{Callback, CallbackHandle, Event, catch_up};
use crate::schema::Schema;
use arc_swap::ArcSwap;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

/// An immutable published value and its serial.
///
/// Serials start at 1 for the construction-time value and grow by exactly
/// one per successful recomputation.
pub struct Snapshot<T> {
    serial: u64,
    value: Arc<T>,
}

impl<T> Snapshot<T> {
    pub(crate) fn new(serial: u64, value: Arc<T>) -> Self {
        Self { serial, value }
    }

    /// The snapshot's serial.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// The published value.
    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    /// Give up the serial and keep the value.
    pub fn into_value(self) -> Arc<T> {
        self.value
    }
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            serial: self.serial,
            value: Arc::clone(&self.value),
        }
    }
}

impl<T> Deref for Snapshot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("serial", &self.serial)
            .field("value", &self.value)
            .finish()
    }
}

struct Inner<T: Schema> {
    /// `None` when no source watches.
    inbox: Option<mpsc::Sender<Event<T>>>,
    /// Held so the events receiver never observes closure.
    _events_tx: mpsc::Sender<Arc<T>>,
    events_rx: Mutex<Option<mpsc::Receiver<Arc<T>>>>,
    next_callback: AtomicU64,
    cancel: CancellationToken,
    stopped: CancellationToken,
    _guard: DropGuard,
}

/// A stacked configuration.
///
/// Reads never block: [`get`](Self::get) loads the current snapshot with a
/// single atomic operation. When a source watches, a background coordinator
/// republishes on every report. Clones share the same instance, and dropping
/// the last clone stops it.
///
/// # Examples
///
/// ```rust
/// use stacked_config::prelude::*;
///
/// #[derive(Debug, Default, Clone, PartialEq, Stackable)]
/// struct AppConfig {
///     pub port: u16,
/// }
///
/// let config = StackedConfig::new(AppConfig { port: 8080 });
/// assert_eq!(config.get().port, 8080);
/// assert_eq!(config.snapshot().serial(), 1);
/// ```
pub struct StackedConfig<T: Schema> {
    current: Arc<ArcSwap<Snapshot<T>>>,
    inner: Arc<Inner<T>>,
}

impl<T: Schema> StackedConfig<T> {
    /// A fixed configuration with no sources.
    pub fn new(value: T) -> Self {
        let current = Arc::new(ArcSwap::from_pointee(Snapshot::new(1, Arc::new(value))));
        let stopped = CancellationToken::new();
        stopped.cancel();
        Self::from_parts(current, None, 1, CancellationToken::new(), stopped)
    }

    /// Start a builder stacking sources onto `defaults`.
    pub fn builder(defaults: T) -> StackedConfigBuilder<T> {
        StackedConfigBuilder::new(defaults)
    }

    pub(crate) fn from_parts(
        current: Arc<ArcSwap<Snapshot<T>>>,
        inbox: Option<mpsc::Sender<Event<T>>>,
        event_capacity: usize,
        cancel: CancellationToken,
        stopped: CancellationToken,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(event_capacity.max(1));
        Self::with_events(current, inbox, (events_tx, events_rx), cancel, stopped)
    }

    pub(crate) fn with_events(
        current: Arc<ArcSwap<Snapshot<T>>>,
        inbox: Option<mpsc::Sender<Event<T>>>,
        (events_tx, events_rx): (mpsc::Sender<Arc<T>>, mpsc::Receiver<Arc<T>>),
        cancel: CancellationToken,
        stopped: CancellationToken,
    ) -> Self {
        let inner = Inner {
            inbox,
            _events_tx: events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            next_callback: AtomicU64::new(1),
            _guard: cancel.clone().drop_guard(),
            cancel,
            stopped,
        };
        Self {
            current,
            inner: Arc::new(inner),
        }
    }

    /// The current value.
    ///
    /// Lock-free; never observes a partially built value.
    pub fn get(&self) -> Arc<T> {
        Arc::clone(self.current.load().value())
    }

    /// The current value with its serial.
    pub fn snapshot(&self) -> Snapshot<T> {
        Snapshot::clone(&self.current.load())
    }

    /// Overwrite `target` with a deep copy of the current value.
    pub fn fill(&self, target: &mut T) {
        *target = deep_copy(self.current.load().value().as_ref());
    }

    /// Take the receiving end of the events channel.
    ///
    /// Every published value is offered to the channel without waiting; a
    /// full channel drops the value, so a slow reader sees gaps but never
    /// stalls the coordinator. The channel never closes, so use
    /// [`stopped`](Self::stopped) to learn that no more values will come.
    ///
    /// Returns `None` after the first call.
    pub fn events(&self) -> Option<mpsc::Receiver<Arc<T>>> {
        self.inner
            .events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Register `callback` to run with `(old, new)` after every publication.
    ///
    /// With `since` set to a snapshot older than the current one, the
    /// callback first runs once with that snapshot's value and the current
    /// value, so nothing published in between is missed. `None` asks for
    /// future changes only.
    ///
    /// Callbacks run one at a time on the dispatch task, in registration
    /// order. Keep them short and non-blocking.
    ///
    /// On an instance that will never publish again, the catch-up runs on
    /// the caller and the returned handle is inert.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Cancelled`] if `cancel` fires while waiting
    /// for room in the coordinator's inbox.
    pub async fn register_callback<F>(
        &self,
        cancel: &CancellationToken,
        since: Option<&Snapshot<T>>,
        callback: F,
    ) -> Result<CallbackHandle<T>>
    where
        F: FnMut(Arc<T>, Arc<T>) + Send + 'static,
    {
        let mut callback: Callback<T> = Box::new(callback);
        let since = since.cloned();

        if let Some(inbox) = &self.inner.inbox {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StackError::Cancelled),
                permit = inbox.reserve() => permit.ok(),
            };
            if let Some(permit) = permit {
                let id = self.inner.next_callback.fetch_add(1, Ordering::Relaxed);
                permit.send(Event::Register {
                    id,
                    since,
                    callback,
                });
                return Ok(CallbackHandle::new(
                    id,
                    inbox.clone(),
                    self.inner.stopped.clone(),
                ));
            }
        }

        let current = self.current.load_full();
        catch_up(since.as_ref(), &current, &mut callback);
        Ok(CallbackHandle::inert())
    }

    /// Whether background coordination is still running.
    pub fn is_watching(&self) -> bool {
        !self.inner.stopped.is_cancelled()
    }

    /// Stop watching. The current snapshot stays readable.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    /// Wait until background coordination has stopped and every queued
    /// callback has run.
    pub async fn stopped(&self) {
        self.inner.stopped.cancelled().await;
    }
}

impl<T: Schema> Clone for StackedConfig<T> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Schema> std::fmt::Debug for StackedConfig<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackedConfig")
            .field("serial", &self.current.load().serial())
            .field("watching", &self.is_watching())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Stackable;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Default, Clone, PartialEq, Stackable)]
    struct TestConfig {
        pub value: i32,
    }

    #[test]
    fn test_create_and_read() {
        let config = StackedConfig::new(TestConfig { value: 42 });
        assert_eq!(config.get().value, 42);
        assert_eq!(config.snapshot().serial(), 1);
        assert!(!config.is_watching());
    }

    #[test]
    fn test_clone_shares_snapshot() {
        let config = StackedConfig::new(TestConfig { value: 42 });
        let config2 = config.clone();
        assert!(Arc::ptr_eq(&config.get(), &config2.get()));
    }

    #[test]
    fn test_fill_copies() {
        let config = StackedConfig::new(TestConfig { value: 7 });
        let mut target = TestConfig::default();
        config.fill(&mut target);
        assert_eq!(target, TestConfig { value: 7 });
    }

    #[test]
    fn test_events_taken_once() {
        let config = StackedConfig::new(TestConfig::default());
        assert!(config.events().is_some());
        assert!(config.events().is_none());
    }

    #[test]
    fn test_snapshot_deref() {
        let snapshot = Snapshot::new(3, Arc::new(TestConfig { value: 5 }));
        let value: &TestConfig = &snapshot;
        assert_eq!(value.value, 5);
        assert_eq!(snapshot.clone().into_value().value, 5);
    }

    #[tokio::test]
    async fn test_register_on_fixed_config_is_inert() {
        let config = StackedConfig::new(TestConfig { value: 1 });
        let calls = Arc::new(StdMutex::new(0));
        let counter = Arc::clone(&calls);
        let handle = config
            .register_callback(&CancellationToken::new(), None, move |_, _| {
                *counter.lock().unwrap() += 1;
            })
            .await
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), 0);
        assert!(handle.unregister(&CancellationToken::new()).await.is_ok());
        config.stopped().await;
    }
}
