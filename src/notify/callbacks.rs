//! Callback registry and its dispatch task.
//!
//! The registry is owned by a single task fed in order by the coordinator:
//! publications, registrations and removals arrive over one queue, so a
//! callback's catch-up and its later deliveries can never interleave or
//! repeat a serial.

use super::coordinator::Event;
use crate::core::Snapshot;
use crate::schema::Schema;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

#[cfg(feature = "metrics")]
use crate::metrics::StackMetrics;

/// A change callback, invoked with the old and the new value.
pub type Callback<T> = Box<dyn FnMut(Arc<T>, Arc<T>) + Send>;

/// Work for the dispatch task, in coordinator order.
pub(crate) enum Dispatch<T> {
    Publish {
        old: Snapshot<T>,
        new: Snapshot<T>,
    },
    Register {
        id: u64,
        since: Option<Snapshot<T>>,
        callback: Callback<T>,
    },
    Unregister {
        id: u64,
        ack: oneshot::Sender<()>,
    },
}

struct Registered<T> {
    id: u64,
    /// Serial already delivered to this callback, by catch-up or baseline.
    baseline: u64,
    callback: Callback<T>,
}

/// Invoke `callback` once if `since` is older than `current`.
///
/// A `None` baseline never catches up. Returns whether it ran.
pub(crate) fn catch_up<T>(
    since: Option<&Snapshot<T>>,
    current: &Snapshot<T>,
    callback: &mut Callback<T>,
) -> bool {
    match since {
        Some(since) if since.serial() < current.serial() => {
            debug!(
                from = since.serial(),
                to = current.serial(),
                "catching up late callback"
            );
            callback(Arc::clone(since.value()), Arc::clone(current.value()));
            true
        }
        _ => false,
    }
}

/// Ordered set of registered callbacks and the latest delivered snapshot.
pub(crate) struct CallbackRegistry<T> {
    latest: Snapshot<T>,
    callbacks: Vec<Registered<T>>,
    #[cfg(feature = "metrics")]
    metrics: Option<Arc<StackMetrics>>,
}

impl<T> CallbackRegistry<T> {
    pub(crate) fn new(latest: Snapshot<T>) -> Self {
        Self {
            latest,
            callbacks: Vec::new(),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    #[cfg(feature = "metrics")]
    pub(crate) fn with_metrics(mut self, metrics: Option<Arc<StackMetrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub(crate) fn register(&mut self, id: u64, since: Option<Snapshot<T>>, mut callback: Callback<T>) {
        catch_up(since.as_ref(), &self.latest, &mut callback);
        trace!(id, baseline = self.latest.serial(), "callback registered");
        self.callbacks.push(Registered {
            id,
            baseline: self.latest.serial(),
            callback,
        });
        self.record_len();
    }

    pub(crate) fn unregister(&mut self, id: u64) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|registered| registered.id != id);
        self.record_len();
        self.callbacks.len() != before
    }

    /// Deliver one publication to every callback registered before it, in
    /// registration order.
    pub(crate) fn publish(&mut self, old: Snapshot<T>, new: Snapshot<T>) {
        for registered in &mut self.callbacks {
            if new.serial() > registered.baseline {
                (registered.callback)(Arc::clone(old.value()), Arc::clone(new.value()));
                registered.baseline = new.serial();
            }
        }
        self.latest = new;
    }

    pub(crate) fn len(&self) -> usize {
        self.callbacks.len()
    }

    #[cfg(feature = "metrics")]
    fn record_len(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.record_callbacks(self.callbacks.len());
        }
    }

    #[cfg(not(feature = "metrics"))]
    fn record_len(&self) {}

    /// Process the queue until the coordinator drops its sender.
    pub(crate) async fn run(mut self, mut queue: mpsc::Receiver<Dispatch<T>>) {
        while let Some(work) = queue.recv().await {
            match work {
                Dispatch::Publish { old, new } => self.publish(old, new),
                Dispatch::Register {
                    id,
                    since,
                    callback,
                } => self.register(id, since, callback),
                Dispatch::Unregister { id, ack } => {
                    self.unregister(id);
                    let _ = ack.send(());
                }
            }
        }
        debug!(remaining = self.len(), "callback dispatch drained");
    }
}

/// Registration returned by [`crate::StackedConfig::register_callback`].
///
/// Dropping the handle leaves the callback registered.
#[must_use = "dropping the handle leaves the callback registered forever"]
pub struct CallbackHandle<T: Schema> {
    id: u64,
    link: Option<(mpsc::Sender<Event<T>>, CancellationToken)>,
}

impl<T: Schema> CallbackHandle<T> {
    pub(crate) fn new(id: u64, inbox: mpsc::Sender<Event<T>>, stopped: CancellationToken) -> Self {
        Self {
            id,
            link: Some((inbox, stopped)),
        }
    }

    /// A handle for an instance that will never deliver again.
    pub(crate) fn inert() -> Self {
        Self { id: 0, link: None }
    }

    /// Identifier of the registration.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the callback.
    ///
    /// Resolves to `Ok(())` once the callback is guaranteed never to run
    /// again. If `cancel` fires first the handle comes back as `Err` so the
    /// removal can be retried; the removal may already be queued by then.
    pub async fn unregister(self, cancel: &CancellationToken) -> std::result::Result<(), Self> {
        let Some((inbox, stopped)) = self.link.clone() else {
            return Ok(());
        };
        let (ack, mut acked) = oneshot::channel();
        let queued = match inbox.try_send(Event::Unregister { id: self.id, ack }) {
            Ok(()) => true,
            Err(TrySendError::Closed(_)) => false,
            Err(TrySendError::Full(event)) => tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self),
                sent = inbox.send(event) => sent.is_ok(),
            },
        };
        if queued {
            tokio::select! {
                biased;
                acked = &mut acked => if acked.is_ok() {
                    return Ok(());
                },
                _ = cancel.cancelled() => return Err(self),
            }
        }
        // The coordinator is gone: wait for dispatch to drain, after which
        // nothing can invoke the callback.
        tokio::select! {
            biased;
            _ = stopped.cancelled() => Ok(()),
            _ = cancel.cancelled() => Err(self),
        }
    }
}

impl<T: Schema> std::fmt::Debug for CallbackHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle")
            .field("id", &self.id)
            .field("active", &self.link.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn snapshot(serial: u64, value: &str) -> Snapshot<String> {
        Snapshot::new(serial, Arc::new(value.to_string()))
    }

    fn recorder(log: &Arc<Mutex<Vec<(String, String)>>>, tag: &'static str) -> Callback<String> {
        let log = Arc::clone(log);
        Box::new(move |old: Arc<String>, new: Arc<String>| {
            log.lock()
                .unwrap()
                .push((tag.to_string(), format!("{old}->{new}")));
        })
    }

    #[test]
    fn test_publish_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new(snapshot(1, "a"));
        registry.register(1, None, recorder(&log, "first"));
        registry.register(2, None, recorder(&log, "second"));

        registry.publish(snapshot(1, "a"), snapshot(2, "b"));

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            [
                ("first".to_string(), "a->b".to_string()),
                ("second".to_string(), "a->b".to_string()),
            ]
        );
    }

    #[test]
    fn test_late_registration_catches_up_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new(snapshot(1, "a"));
        registry.publish(snapshot(1, "a"), snapshot(2, "b"));
        registry.publish(snapshot(2, "b"), snapshot(3, "c"));

        registry.register(7, Some(snapshot(1, "a")), recorder(&log, "late"));
        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(log.lock().unwrap()[0].1, "a->c");

        registry.publish(snapshot(3, "c"), snapshot(4, "d"));
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].1, "c->d");
    }

    #[test]
    fn test_zero_token_never_catches_up() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new(snapshot(5, "e"));
        registry.register(1, None, recorder(&log, "fresh"));
        registry.register(2, Some(snapshot(5, "e")), recorder(&log, "current"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unregister_stops_delivery() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new(snapshot(1, "a"));
        registry.register(1, None, recorder(&log, "gone"));
        assert!(registry.unregister(1));
        assert!(!registry.unregister(1));

        registry.publish(snapshot(1, "a"), snapshot(2, "b"));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_run_drains_queue_then_exits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel(8);
        let registry = CallbackRegistry::new(snapshot(1, "a"));

        tx.send(Dispatch::Register {
            id: 1,
            since: None,
            callback: recorder(&log, "cb"),
        })
        .await
        .unwrap();
        tx.send(Dispatch::Publish {
            old: snapshot(1, "a"),
            new: snapshot(2, "b"),
        })
        .await
        .unwrap();
        let (ack, acked) = oneshot::channel();
        tx.send(Dispatch::Unregister { id: 1, ack }).await.unwrap();
        tx.send(Dispatch::Publish {
            old: snapshot(2, "b"),
            new: snapshot(3, "c"),
        })
        .await
        .unwrap();
        drop(tx);

        registry.run(rx).await;
        acked.await.unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[derive(Debug, Default, Clone, PartialEq, crate::Stackable)]
    struct Empty {}

    #[tokio::test]
    async fn test_inert_handle_unregisters_immediately() {
        let handle = CallbackHandle::<Empty>::inert();
        assert!(handle.unregister(&CancellationToken::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_unregister_queues_removal_and_returns_handle() {
        let (inbox, mut rx) = mpsc::channel(1);
        let stopped = CancellationToken::new();
        let handle = CallbackHandle::<Empty>::new(9, inbox, stopped.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let handle = handle.unregister(&cancel).await.unwrap_err();
        assert_eq!(handle.id(), 9);
        match rx.try_recv() {
            Ok(Event::Unregister { id, ack }) => {
                assert_eq!(id, 9);
                ack.send(()).unwrap();
            }
            _ => panic!("expected a queued removal"),
        }

        let retry = tokio::spawn(async move { handle.unregister(&CancellationToken::new()).await });
        match rx.recv().await {
            Some(Event::Unregister { id, ack }) => {
                assert_eq!(id, 9);
                ack.send(()).unwrap();
            }
            _ => panic!("expected a second removal"),
        }
        assert!(retry.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_unregister_with_full_inbox_returns_handle() {
        let (inbox, mut rx) = mpsc::channel(1);
        let stopped = CancellationToken::new();
        inbox.try_send(Event::Done { source: 0 }).unwrap();
        let handle = CallbackHandle::<Empty>::new(3, inbox, stopped.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let handle = handle.unregister(&cancel).await.unwrap_err();
        assert!(matches!(rx.try_recv(), Ok(Event::Done { source: 0 })));
        assert!(rx.try_recv().is_err());

        drop(rx);
        stopped.cancel();
        assert!(handle.unregister(&CancellationToken::new()).await.is_ok());
    }
}
