//! Write-only handle through which a watching source reports.

use super::coordinator::Event;
use crate::error::{Result, SourceError, StackError};
use crate::schema::{Schema, Shadow};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Handed to [`crate::sources::Watcher::watch`]; reports new values, errors
/// and completion for one source.
///
/// Every report waits for room in the coordinator's bounded inbox and gives
/// up when `cancel` fires.
///
/// # Errors
///
/// All report methods return [`StackError::Cancelled`] when `cancel` fires
/// first and [`StackError::Stopped`] once the coordinator has exited.
pub struct Reporter<T: Schema> {
    source: usize,
    name: Arc<str>,
    inbox: mpsc::Sender<Event<T>>,
    /// Cleared for reporters handed to a wrapped source whose completion
    /// must not end the wrapper's watch.
    forwards_done: bool,
}

impl<T: Schema> Reporter<T> {
    pub(crate) fn new(source: usize, name: impl Into<Arc<str>>, inbox: mpsc::Sender<Event<T>>) -> Self {
        Self {
            source,
            name: name.into(),
            inbox,
            forwards_done: true,
        }
    }

    /// A reporter for the same source whose [`done`](Self::done) is a no-op.
    pub(crate) fn without_done(&self) -> Self {
        Self {
            forwards_done: false,
            ..self.clone()
        }
    }

    /// Position of the reporting source in precedence order.
    pub fn source_index(&self) -> usize {
        self.source
    }

    /// Name of the reporting source.
    pub fn source_name(&self) -> &str {
        &self.name
    }

    /// Report the source's new value, replacing whatever it reported before.
    pub async fn report_value(&self, cancel: &CancellationToken, shadow: Shadow<T>) -> Result<()> {
        self.send(
            cancel,
            Event::Value {
                source: self.source,
                shadow,
            },
        )
        .await
    }

    /// Report a failure. The current snapshot stays in place.
    pub async fn report_error(
        &self,
        cancel: &CancellationToken,
        error: impl Into<SourceError>,
    ) -> Result<()> {
        self.send(
            cancel,
            Event::Error {
                source: self.source,
                error: error.into(),
            },
        )
        .await
    }

    /// Signal that this source will never report again.
    pub async fn done(&self, cancel: &CancellationToken) -> Result<()> {
        if !self.forwards_done {
            trace!(source = self.source, name = %self.name, "completion of wrapped source ignored");
            return Ok(());
        }
        self.send(cancel, Event::Done { source: self.source }).await
    }

    async fn send(&self, cancel: &CancellationToken, event: Event<T>) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StackError::Cancelled),
            sent = self.inbox.send(event) => sent.map_err(|_| StackError::Stopped),
        }
    }
}

impl<T: Schema> Clone for Reporter<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source,
            name: Arc::clone(&self.name),
            inbox: self.inbox.clone(),
            forwards_done: self.forwards_done,
        }
    }
}

impl<T: Schema> std::fmt::Debug for Reporter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq, crate::Stackable)]
    struct Empty {}

    #[tokio::test]
    async fn test_cancel_while_inbox_full() {
        let (inbox, mut rx) = mpsc::channel(1);
        let reporter = Reporter::<Empty>::new(0, "full", inbox);
        let cancel = CancellationToken::new();
        reporter.report_value(&cancel, None).await.unwrap();

        let waiting = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            waiting.cancel();
        });
        let blocked = reporter.report_error(&cancel, "late").await;
        assert!(matches!(blocked, Err(StackError::Cancelled)));

        assert!(matches!(rx.try_recv(), Ok(Event::Value { source: 0, .. })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_inbox_reports_stopped() {
        let (inbox, rx) = mpsc::channel(1);
        let reporter = Reporter::<Empty>::new(1, "orphan", inbox);
        drop(rx);

        let cancel = CancellationToken::new();
        assert!(matches!(
            reporter.report_value(&cancel, None).await,
            Err(StackError::Stopped)
        ));
        assert!(matches!(reporter.done(&cancel).await, Err(StackError::Stopped)));
    }

    #[tokio::test]
    async fn test_without_done_swallows_completion_only() {
        let (inbox, mut rx) = mpsc::channel(4);
        let reporter = Reporter::<Empty>::new(2, "wrapped", inbox).without_done();
        let cancel = CancellationToken::new();

        reporter.done(&cancel).await.unwrap();
        reporter.report_value(&cancel, None).await.unwrap();
        assert!(matches!(rx.try_recv(), Ok(Event::Value { source: 2, .. })));
        assert!(rx.try_recv().is_err());
    }
}
