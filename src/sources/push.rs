//! In-memory watching source fed by application code.

use super::{Source, Watcher};
use crate::copy::deep_copy;
use crate::error::{Result, SourceError, StackError};
use crate::notify::Reporter;
use crate::schema::{Schema, Shadow};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DEFAULT_CAPACITY: usize = 16;

enum Pushed<T: Schema> {
    Value(Shadow<T>),
    Error(SourceError),
    Done,
}

/// A watching source whose values come from a [`Publisher`].
///
/// Updates queue in a bounded channel until the configuration starts
/// watching, so a value published before `build` is reported again
/// afterwards. The latest published value is also what
/// [`Source::value`] returns.
///
/// Dropping every publisher counts as [`Publisher::finish`].
///
/// # Examples
///
/// ```rust
/// use stacked_config::prelude::*;
/// use tokio_util::sync::CancellationToken;
///
/// #[derive(Debug, Default, Clone, PartialEq, Stackable)]
/// struct AppConfig {
///     pub level: String,
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<()> {
/// let (source, publisher) = PushSource::new("runtime", None);
/// let config = StackedConfig::builder(AppConfig { level: "info".into() })
///     .with_source(source)
///     .build()
///     .await?;
///
/// let mut events = config.events().unwrap();
/// let cancel = CancellationToken::new();
/// publisher
///     .publish(&cancel, Some(AppConfigShadow { level: Some("debug".into()) }))
///     .await?;
/// assert_eq!(events.recv().await.unwrap().level, "debug");
/// # Ok(())
/// # }
/// ```
pub struct PushSource<T: Schema> {
    name: String,
    latest: Arc<Mutex<Shadow<T>>>,
    updates: Mutex<Option<mpsc::Receiver<Pushed<T>>>>,
}

/// Write end of a [`PushSource`].
pub struct Publisher<T: Schema> {
    latest: Arc<Mutex<Shadow<T>>>,
    updates: mpsc::Sender<Pushed<T>>,
}

impl<T: Schema> PushSource<T> {
    /// A push source starting at `initial`.
    pub fn new(name: impl Into<String>, initial: Shadow<T>) -> (Self, Publisher<T>) {
        Self::with_capacity(name, initial, DEFAULT_CAPACITY)
    }

    /// As [`new`](Self::new) with room for `capacity` queued updates.
    pub fn with_capacity(
        name: impl Into<String>,
        initial: Shadow<T>,
        capacity: usize,
    ) -> (Self, Publisher<T>) {
        let latest = Arc::new(Mutex::new(initial));
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let source = Self {
            name: name.into(),
            latest: Arc::clone(&latest),
            updates: Mutex::new(Some(rx)),
        };
        (source, Publisher { latest, updates: tx })
    }
}

impl<T: Schema> Publisher<T> {
    /// Replace the source's value.
    ///
    /// # Errors
    ///
    /// [`StackError::Cancelled`] if `cancel` fires while the queue is full,
    /// [`StackError::Stopped`] once the source has stopped forwarding.
    pub async fn publish(&self, cancel: &CancellationToken, shadow: Shadow<T>) -> Result<()> {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) =
            shadow.as_ref().map(deep_copy);
        self.send(cancel, Pushed::Value(shadow)).await
    }

    /// Report a failure without changing the value.
    ///
    /// # Errors
    ///
    /// As [`publish`](Self::publish).
    pub async fn fail(&self, cancel: &CancellationToken, error: impl Into<SourceError>) -> Result<()> {
        self.send(cancel, Pushed::Error(error.into())).await
    }

    /// Signal that nothing more will be published.
    ///
    /// # Errors
    ///
    /// As [`publish`](Self::publish).
    pub async fn finish(&self, cancel: &CancellationToken) -> Result<()> {
        self.send(cancel, Pushed::Done).await
    }

    async fn send(&self, cancel: &CancellationToken, update: Pushed<T>) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StackError::Cancelled),
            sent = self.updates.send(update) => sent.map_err(|_| StackError::Stopped),
        }
    }
}

impl<T: Schema> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            latest: Arc::clone(&self.latest),
            updates: self.updates.clone(),
        }
    }
}

impl<T: Schema> std::fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("closed", &self.updates.is_closed())
            .finish()
    }
}

impl<T: Schema> std::fmt::Debug for PushSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushSource").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<T: Schema> Source<T> for PushSource<T> {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn value(&self, _cancel: &CancellationToken) -> std::result::Result<Shadow<T>, SourceError> {
        let latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(latest.as_ref().map(deep_copy))
    }

    fn as_watcher(self: Arc<Self>) -> Option<Arc<dyn Watcher<T>>> {
        Some(self)
    }
}

#[async_trait]
impl<T: Schema> Watcher<T> for PushSource<T> {
    async fn watch(
        self: Arc<Self>,
        cancel: CancellationToken,
        reporter: Reporter<T>,
    ) -> std::result::Result<(), SourceError> {
        let mut updates = self
            .updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or("push source is already being watched")?;

        tokio::spawn(async move {
            loop {
                let update = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    update = updates.recv() => update,
                };
                let reported = match update {
                    Some(Pushed::Value(shadow)) => reporter.report_value(&cancel, shadow).await,
                    Some(Pushed::Error(error)) => reporter.report_error(&cancel, error).await,
                    Some(Pushed::Done) | None => {
                        let _ = reporter.done(&cancel).await;
                        break;
                    }
                };
                if reported.is_err() {
                    break;
                }
            }
            debug!(source = reporter.source_name(), "push source stopped forwarding");
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Stackable;

    #[derive(Debug, Default, Clone, PartialEq, Stackable)]
    struct TestConfig {
        pub level: String,
    }

    fn level(value: &str) -> Shadow<TestConfig> {
        Some(TestConfigShadow {
            level: Some(value.into()),
        })
    }

    #[tokio::test]
    async fn test_value_tracks_latest_publish() {
        let (source, publisher) = PushSource::<TestConfig>::new("push", level("a"));
        let cancel = CancellationToken::new();
        assert_eq!(
            source.value(&cancel).await.unwrap().unwrap().level.as_deref(),
            Some("a")
        );

        publisher.publish(&cancel, level("b")).await.unwrap();
        assert_eq!(
            source.value(&cancel).await.unwrap().unwrap().level.as_deref(),
            Some("b")
        );
    }

    #[tokio::test]
    async fn test_full_queue_honors_cancellation() {
        let (_source, publisher) = PushSource::<TestConfig>::with_capacity("push", None, 1);
        let cancel = CancellationToken::new();
        publisher.publish(&cancel, level("a")).await.unwrap();

        cancel.cancel();
        assert!(matches!(
            publisher.publish(&cancel, level("b")).await,
            Err(StackError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_second_watch_is_refused() {
        let (source, _publisher) = PushSource::<TestConfig>::new("push", None);
        let source = Arc::new(source);
        let (inbox, _rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        Arc::clone(&source)
            .watch(cancel.clone(), Reporter::new(0, "push", inbox.clone()))
            .await
            .unwrap();
        assert!(
            source
                .watch(cancel.clone(), Reporter::new(0, "push", inbox))
                .await
                .is_err()
        );
        cancel.cancel();
    }
}
