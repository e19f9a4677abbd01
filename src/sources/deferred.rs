//! A placeholder for a source that is only known after construction.

use super::{Source, Watcher};
use crate::error::SourceError;
use crate::notify::Reporter;
use crate::schema::{Schema, Shadow};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct WatchContext<T: Schema> {
    cancel: CancellationToken,
    reporter: Reporter<T>,
    runtime: Handle,
}

struct State<T: Schema> {
    inner: Option<Arc<dyn Source<T>>>,
    watch: Option<WatchContext<T>>,
    /// Stops forwarding from the previous inner source.
    forwarding: Option<CancellationToken>,
}

/// Reports nothing until [`set_source`](Self::set_source) supplies the real
/// source, then reports on its behalf.
///
/// Useful when a source depends on something parsed later, such as a file
/// path given on the command line. Once watching, setting a source reports
/// its value right away and forwards its own reports if it watches too.
/// A deferred source never reports completion.
pub struct DeferredSource<T: Schema> {
    name: String,
    state: Mutex<State<T>>,
}

impl<T: Schema> DeferredSource<T> {
    /// An empty placeholder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State {
                inner: None,
                watch: None,
                forwarding: None,
            }),
        }
    }

    /// Supply the real source, replacing any earlier one.
    pub fn set_source<S: Source<T> + 'static>(&self, source: S) {
        self.set_shared_source(Arc::new(source));
    }

    /// As [`set_source`](Self::set_source) for a shared source.
    pub fn set_shared_source(&self, source: Arc<dyn Source<T>>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.inner = Some(Arc::clone(&source));
        if let Some(previous) = state.forwarding.take() {
            previous.cancel();
        }
        let Some(watch) = &state.watch else {
            return;
        };

        let cancel = watch.cancel.child_token();
        let reporter = watch.reporter.without_done();
        debug!(source = %self.name, inner = %source.name(), "deferred source resolved");
        watch.runtime.spawn(forward(source, cancel.clone(), reporter));
        state.forwarding = Some(cancel);
    }

    /// Whether a real source has been supplied.
    pub fn is_set(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .inner
            .is_some()
    }

    fn inner(&self) -> Option<Arc<dyn Source<T>>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .inner
            .clone()
    }
}

/// Report `source`'s value, then hand its own reporting over.
///
/// `reporter` must not forward completion: the inner source finishing never
/// ends the deferred source's watch.
async fn forward<T: Schema>(source: Arc<dyn Source<T>>, cancel: CancellationToken, reporter: Reporter<T>) {
    let reported = match source.value(&cancel).await {
        Ok(shadow) => reporter.report_value(&cancel, shadow).await,
        Err(error) => reporter.report_error(&cancel, error).await,
    };
    if reported.is_err() {
        return;
    }
    if let Some(watcher) = source.as_watcher() {
        if let Err(error) = watcher.watch(cancel.clone(), reporter.clone()).await {
            let _ = reporter.report_error(&cancel, error).await;
        }
    }
}

#[async_trait]
impl<T: Schema> Source<T> for DeferredSource<T> {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn value(&self, cancel: &CancellationToken) -> Result<Shadow<T>, SourceError> {
        match self.inner() {
            Some(inner) => inner.value(cancel).await,
            None => Ok(None),
        }
    }

    fn as_watcher(self: Arc<Self>) -> Option<Arc<dyn Watcher<T>>> {
        Some(self)
    }
}

#[async_trait]
impl<T: Schema> Watcher<T> for DeferredSource<T> {
    async fn watch(
        self: Arc<Self>,
        cancel: CancellationToken,
        reporter: Reporter<T>,
    ) -> Result<(), SourceError> {
        let inner_watcher = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.watch.is_some() {
                return Err("deferred source is already being watched".into());
            }
            state.watch = Some(WatchContext {
                cancel: cancel.clone(),
                reporter: reporter.clone(),
                runtime: Handle::current(),
            });
            // A source set before construction already supplied the value;
            // only its own reports remain to forward.
            let inner_watcher = state.inner.clone().and_then(|inner| inner.as_watcher());
            if inner_watcher.is_some() {
                state.forwarding = Some(cancel.child_token());
            }
            inner_watcher.zip(state.forwarding.clone())
        };

        if let Some((watcher, forwarding)) = inner_watcher {
            watcher.watch(forwarding, reporter.without_done()).await?;
        }
        Ok(())
    }
}

impl<T: Schema> std::fmt::Debug for DeferredSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredSource")
            .field("name", &self.name)
            .field("set", &self.is_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Stackable;
    use crate::notify::Event;
    use crate::sources::StaticSource;
    use tokio::sync::mpsc;

    #[derive(Debug, Default, Clone, PartialEq, Stackable)]
    struct TestConfig {
        pub path: String,
    }

    fn path(value: &str) -> Shadow<TestConfig> {
        Some(TestConfigShadow {
            path: Some(value.into()),
        })
    }

    #[tokio::test]
    async fn test_empty_until_set() {
        let deferred = DeferredSource::<TestConfig>::new("later");
        let cancel = CancellationToken::new();
        assert!(deferred.value(&cancel).await.unwrap().is_none());
        assert!(!deferred.is_set());

        deferred.set_source(StaticSource::new("file", path("/etc/app")));
        let value = deferred.value(&cancel).await.unwrap().unwrap();
        assert_eq!(value.path.as_deref(), Some("/etc/app"));
    }

    #[tokio::test]
    async fn test_set_while_watching_reports() {
        let deferred = Arc::new(DeferredSource::<TestConfig>::new("later"));
        let (inbox, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        Arc::clone(&deferred)
            .watch(cancel.clone(), Reporter::new(2, "later", inbox))
            .await
            .unwrap();

        deferred.set_source(StaticSource::new("file", path("/srv/app")));
        match rx.recv().await {
            Some(Event::Value { source, shadow }) => {
                assert_eq!(source, 2);
                assert_eq!(shadow.unwrap().path.as_deref(), Some("/srv/app"));
            }
            _ => panic!("expected a value report"),
        }
        cancel.cancel();
    }
}
