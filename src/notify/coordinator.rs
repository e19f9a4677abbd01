//! The coordinator task: the single owner of per-source state.
//!
//! Source reports and callback requests arrive over one bounded inbox. Every
//! recomputation happens here, one at a time, and each published snapshot is
//! fanned out to the accessor, the events channel and the dispatch queue.

use super::callbacks::{Callback, Dispatch};
use crate::core::Snapshot;
use crate::core::stacker::{Rejected, Stacker};
use crate::error::{SourceError, StackError};
use crate::schema::{Schema, Shadow};
use arc_swap::ArcSwap;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[cfg(feature = "metrics")]
use crate::metrics::StackMetrics;

/// Invoked on every watch-time failure with the error, the current value and
/// the rejected value when there is one.
pub type ErrorHook<T> = Arc<dyn Fn(&StackError, &T, Option<&T>) + Send + Sync>;

/// Invoked with every value published by a watch-driven recomputation.
pub type ValueHook<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A message for the coordinator.
pub(crate) enum Event<T: Schema> {
    Value {
        source: usize,
        shadow: Shadow<T>,
    },
    Error {
        source: usize,
        error: SourceError,
    },
    Done {
        source: usize,
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

/// User handlers fired from the coordinator task.
pub(crate) struct Hooks<T> {
    pub on_error: Option<ErrorHook<T>>,
    pub on_new_value: Option<ValueHook<T>>,
}

impl<T> Default for Hooks<T> {
    fn default() -> Self {
        Self {
            on_error: None,
            on_new_value: None,
        }
    }
}

pub(crate) struct Coordinator<T: Schema> {
    stacker: Stacker<T>,
    snapshots: Vec<Shadow<T>>,
    watching: Vec<bool>,
    current: Arc<ArcSwap<Snapshot<T>>>,
    events: mpsc::Sender<Arc<T>>,
    dispatch: mpsc::Sender<Dispatch<T>>,
    hooks: Hooks<T>,
    #[cfg(feature = "metrics")]
    metrics: Option<Arc<StackMetrics>>,
}

impl<T: Schema> Coordinator<T> {
    /// `snapshots` holds each source's construction-time value; `watching`
    /// flags the sources that were handed a reporter.
    pub(crate) fn new(
        stacker: Stacker<T>,
        snapshots: Vec<Shadow<T>>,
        watching: Vec<bool>,
        current: Arc<ArcSwap<Snapshot<T>>>,
        events: mpsc::Sender<Arc<T>>,
        dispatch: mpsc::Sender<Dispatch<T>>,
        hooks: Hooks<T>,
    ) -> Self {
        Self {
            stacker,
            snapshots,
            watching,
            current,
            events,
            dispatch,
            hooks,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    #[cfg(feature = "metrics")]
    pub(crate) fn with_metrics(mut self, metrics: Option<Arc<StackMetrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    fn active(&self) -> usize {
        self.watching.iter().filter(|watching| **watching).count()
    }

    /// Process events until every watched source is done, the inbox closes
    /// or `cancel` fires.
    ///
    /// Callback requests still queued when the loop ends are forwarded, so
    /// a pending unregister is always acknowledged.
    pub(crate) async fn run(mut self, mut inbox: mpsc::Receiver<Event<T>>, cancel: CancellationToken) {
        debug!(watching = self.active(), "coordinator started");
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("coordinator cancelled");
                    break;
                }
                event = inbox.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            if self.handle(event).await.is_break() {
                break;
            }
        }

        // Waits out reserved permits, so a registration already granted a
        // slot is still forwarded.
        inbox.close();
        while let Some(event) = inbox.recv().await {
            match event {
                Event::Register {
                    id,
                    since,
                    callback,
                } => {
                    self.forward(Dispatch::Register {
                        id,
                        since,
                        callback,
                    })
                    .await
                }
                Event::Unregister { id, ack } => self.forward(Dispatch::Unregister { id, ack }).await,
                Event::Value { .. } | Event::Error { .. } | Event::Done { .. } => {}
            }
        }
        info!(serial = self.current.load().serial(), "coordinator stopped");
    }

    async fn handle(&mut self, event: Event<T>) -> ControlFlow<()> {
        match event {
            Event::Value { source, shadow } => {
                if let Some(slot) = self.snapshots.get_mut(source) {
                    *slot = shadow;
                    self.restack().await;
                }
            }
            Event::Error { source, error } => {
                let error = StackError::Source {
                    index: source,
                    name: self.stacker.name(source),
                    source: error,
                };
                warn!(source, %error, "source reported an error");
                if let Some(hook) = &self.hooks.on_error {
                    let current = self.current.load_full();
                    hook(&error, current.value().as_ref(), None);
                }
            }
            Event::Done { source } => {
                if let Some(watching) = self.watching.get_mut(source) {
                    *watching = false;
                }
                debug!(source, remaining = self.active(), "source finished watching");
                if self.active() == 0 {
                    info!("all watched sources finished");
                    return ControlFlow::Break(());
                }
            }
            Event::Register {
                id,
                since,
                callback,
            } => {
                self.forward(Dispatch::Register {
                    id,
                    since,
                    callback,
                })
                .await
            }
            Event::Unregister { id, ack } => self.forward(Dispatch::Unregister { id, ack }).await,
        }
        ControlFlow::Continue(())
    }

    /// Recompute from the defaults and publish on success.
    async fn restack(&mut self) {
        #[cfg(feature = "metrics")]
        let timer = self.metrics.as_ref().map(|metrics| metrics.start_restack());

        let old = self.current.load_full();
        match self.stacker.stack(&self.snapshots, true) {
            Ok(value) => {
                let new = Snapshot::new(old.serial() + 1, Arc::new(value));
                self.current.store(Arc::new(new.clone()));
                debug!(serial = new.serial(), "published snapshot");

                #[cfg(feature = "metrics")]
                if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
                    metrics.record_restack_success(timer, new.serial());
                }

                if let Some(hook) = &self.hooks.on_new_value {
                    hook(new.value().as_ref());
                }

                match self.events.try_send(Arc::clone(new.value())) {
                    Ok(()) | Err(TrySendError::Closed(_)) => {}
                    Err(TrySendError::Full(_)) => {
                        #[cfg(feature = "metrics")]
                        if let Some(metrics) = &self.metrics {
                            metrics.record_dropped_event();
                        }
                        warn!(serial = new.serial(), "events channel full, dropping value");
                    }
                }

                self.forward(Dispatch::Publish {
                    old: Snapshot::clone(&old),
                    new,
                })
                .await;
            }
            Err(Rejected { error, attempted }) => {
                warn!(serial = old.serial(), %error, "recomputation rejected, keeping current snapshot");

                #[cfg(feature = "metrics")]
                if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
                    metrics.record_restack_failure(timer);
                    if matches!(error, StackError::Verification(_)) {
                        metrics.record_verification_failure();
                    }
                }

                if let Some(hook) = &self.hooks.on_error {
                    hook(&error, old.value().as_ref(), attempted.as_ref());
                }
            }
        }
    }

    async fn forward(&self, work: Dispatch<T>) {
        // The dispatch task only exits after this sender is dropped.
        let _ = self.dispatch.send(work).await;
    }
}
