//! Builder for constructing StackedConfig instances.

use super::config_handle::{Snapshot, StackedConfig};
use super::stacker::Stacker;
use crate::error::{Result, StackError};
use crate::notify::{CallbackRegistry, Coordinator, ErrorHook, Hooks, Reporter, ValueHook};
use crate::schema::{Schema, Shadow};
use crate::sources::Source;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[cfg(feature = "metrics")]
use crate::metrics::StackMetrics;

const DEFAULT_EVENT_CAPACITY: usize = 1;
const DEFAULT_INBOX_CAPACITY: usize = 64;
const DISPATCH_CAPACITY: usize = 64;

/// Builder for a [`StackedConfig`].
///
/// Sources are stacked in the order they are added: later sources override
/// earlier ones.
///
/// # Examples
///
/// ```rust
/// use stacked_config::prelude::*;
///
/// #[derive(Debug, Default, Clone, PartialEq, Stackable)]
/// struct AppConfig {
///     pub host: String,
///     pub port: u16,
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<()> {
/// let defaults = AppConfig { host: "localhost".into(), port: 8080 };
/// let config = StackedConfig::builder(defaults)
///     .with_source(StaticSource::<AppConfig>::new(
///         "file",
///         Some(AppConfigShadow { host: Some("db.internal".into()), port: None }),
///     ))
///     .with_source(StaticSource::<AppConfig>::new(
///         "env",
///         Some(AppConfigShadow { port: Some(5432), ..Default::default() }),
///     ))
///     .on_error(|err, _current, _attempted| eprintln!("config update rejected: {err}"))
///     .build()
///     .await?;
///
/// assert_eq!(config.get().host, "db.internal");
/// assert_eq!(config.get().port, 5432);
/// # Ok(())
/// # }
/// ```
pub struct StackedConfigBuilder<T: Schema> {
    defaults: T,
    sources: Vec<Arc<dyn Source<T>>>,
    hooks: Hooks<T>,
    verify_initial: bool,
    event_capacity: usize,
    inbox_capacity: usize,
    cancel: CancellationToken,
    #[cfg(feature = "metrics")]
    metrics: Option<Arc<StackMetrics>>,
}

impl<T: Schema> StackedConfigBuilder<T> {
    /// A builder stacking onto `defaults`.
    pub fn new(defaults: T) -> Self {
        Self {
            defaults,
            sources: Vec::new(),
            hooks: Hooks::default(),
            verify_initial: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            cancel: CancellationToken::new(),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Add a source above every source added so far.
    pub fn with_source<S: Source<T> + 'static>(mut self, source: S) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Add a source the caller keeps a handle to.
    pub fn with_shared_source(mut self, source: Arc<dyn Source<T>>) -> Self {
        self.sources.push(source);
        self
    }

    /// Handle failures after construction: source errors, overlay errors
    /// and rejected values.
    ///
    /// Receives the error, the current value and the rejected value when
    /// there is one. Without a handler such failures are only logged.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&StackError, &T, Option<&T>) + Send + Sync + 'static,
    {
        self.hooks.on_error = Some(Arc::new(handler) as ErrorHook<T>);
        self
    }

    /// Observe every value published after construction.
    pub fn on_new_value<F>(mut self, handler: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.hooks.on_new_value = Some(Arc::new(handler) as ValueHook<T>);
        self
    }

    /// Publish the construction-time value even if it fails verification.
    ///
    /// Later recomputations are always verified.
    pub fn skip_initial_verification(mut self) -> Self {
        self.verify_initial = false;
        self
    }

    /// Buffer size of the [`StackedConfig::events`] channel. Default 1.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Buffer size of the coordinator's inbox. Default 64.
    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity.max(1);
        self
    }

    /// Stop the instance when `parent` is cancelled.
    ///
    /// Also bounds how long `build` waits for initial values.
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    /// Record metrics for this instance.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, meter: opentelemetry::metrics::Meter) -> Self {
        self.metrics = Some(Arc::new(StackMetrics::new(meter)));
        self
    }

    /// Build the configuration.
    ///
    /// Asks every source for its value, stacks them onto the defaults and
    /// publishes the result as serial 1. If any source watches, starts the
    /// coordinator and dispatch tasks and hands each watcher its reporter;
    /// this needs a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`StackError::Source`] if a source fails to produce its value
    /// - [`StackError::Overlay`] if a value cannot be overlaid
    /// - [`StackError::Verification`] if the merged value is rejected
    /// - [`StackError::Watch`] if a watcher fails to start
    /// - [`StackError::Cancelled`] if the cancellation token fires
    pub async fn build(self) -> Result<StackedConfig<T>> {
        let names: Vec<String> = self.sources.iter().map(|source| source.name()).collect();
        debug!(sources = names.len(), "building stacked configuration");

        let mut snapshots: Vec<Shadow<T>> = Vec::with_capacity(self.sources.len());
        for (index, source) in self.sources.iter().enumerate() {
            let value = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(StackError::Cancelled),
                value = source.value(&self.cancel) => value,
            };
            let shadow = value.map_err(|source| StackError::Source {
                index,
                name: names[index].clone(),
                source,
            })?;
            snapshots.push(shadow);
        }

        let stacker = Stacker::new(&self.defaults, names.clone());
        let value = stacker
            .stack(&snapshots, self.verify_initial)
            .map_err(|rejected| rejected.error)?;
        let initial = Snapshot::new(1, Arc::new(value));
        let current = Arc::new(ArcSwap::from_pointee(initial.clone()));

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            let timer = metrics.start_restack();
            metrics.record_restack_success(timer, 1);
        }

        let watchers: Vec<_> = self
            .sources
            .iter()
            .enumerate()
            .filter_map(|(index, source)| Arc::clone(source).as_watcher().map(|watcher| (index, watcher)))
            .collect();

        let (events_tx, events_rx) = mpsc::channel(self.event_capacity);
        let stopped = CancellationToken::new();

        if watchers.is_empty() {
            debug!("no watching sources, configuration is fixed");
            stopped.cancel();
            return Ok(StackedConfig::with_events(
                current,
                None,
                (events_tx, events_rx),
                self.cancel,
                stopped,
            ));
        }

        let (inbox_tx, inbox_rx) = mpsc::channel(self.inbox_capacity);
        let (dispatch_tx, dispatch_rx) = mpsc::channel(DISPATCH_CAPACITY);

        let mut watching = vec![false; self.sources.len()];
        for (index, _) in &watchers {
            watching[*index] = true;
        }

        let coordinator = Coordinator::new(
            stacker,
            snapshots,
            watching,
            Arc::clone(&current),
            events_tx.clone(),
            dispatch_tx,
            self.hooks,
        );
        let registry = CallbackRegistry::new(initial);

        #[cfg(feature = "metrics")]
        let (coordinator, registry) = (
            coordinator.with_metrics(self.metrics.clone()),
            registry.with_metrics(self.metrics.clone()),
        );

        tokio::spawn(coordinator.run(inbox_rx, self.cancel.clone()));
        let dispatch_done = stopped.clone();
        tokio::spawn(async move {
            registry.run(dispatch_rx).await;
            dispatch_done.cancel();
        });

        let config = StackedConfig::with_events(
            current,
            Some(inbox_tx.clone()),
            (events_tx, events_rx),
            self.cancel.clone(),
            stopped,
        );

        for (index, watcher) in watchers {
            let reporter = Reporter::new(index, names[index].as_str(), inbox_tx.clone());
            if let Err(source) = watcher.watch(self.cancel.clone(), reporter).await {
                warn!(index, name = %names[index], error = %source, "watcher failed to start");
                config.shutdown();
                return Err(StackError::Watch {
                    index,
                    name: names[index].clone(),
                    source,
                });
            }
        }

        debug!(watching = names.len(), "stacked configuration active");
        Ok(config)
    }
}

impl<T: Schema> std::fmt::Debug for StackedConfigBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackedConfigBuilder")
            .field("sources", &self.sources.len())
            .field("verify_initial", &self.verify_initial)
            .field("event_capacity", &self.event_capacity)
            .field("inbox_capacity", &self.inbox_capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{StaticSource, Watcher};
    use crate::{SourceError, Stackable, Verify, VerifyError};
    use async_trait::async_trait;

    #[derive(Debug, Default, Clone, PartialEq, Stackable)]
    #[stack(verify)]
    struct TestConfig {
        pub port: u16,
        pub host: String,
    }

    impl Verify for TestConfig {
        fn verify(&self) -> std::result::Result<(), VerifyError> {
            if self.port < 1024 {
                return Err(VerifyError::invalid_field("port", "must be >= 1024"));
            }
            Ok(())
        }
    }

    fn defaults() -> TestConfig {
        TestConfig {
            port: 8080,
            host: "localhost".into(),
        }
    }

    fn port(port: u16) -> StaticSource<TestConfig> {
        StaticSource::new(
            format!("port {port}"),
            Some(TestConfigShadow {
                port: Some(port),
                ..Default::default()
            }),
        )
    }

    struct Broken;

    #[async_trait]
    impl Source<TestConfig> for Broken {
        async fn value(
            &self,
            _cancel: &CancellationToken,
        ) -> std::result::Result<Shadow<TestConfig>, SourceError> {
            Err("unreachable backend".into())
        }
    }

    struct RefusesToWatch;

    #[async_trait]
    impl Source<TestConfig> for RefusesToWatch {
        fn name(&self) -> String {
            "refuses".into()
        }

        async fn value(
            &self,
            _cancel: &CancellationToken,
        ) -> std::result::Result<Shadow<TestConfig>, SourceError> {
            Ok(None)
        }

        fn as_watcher(self: Arc<Self>) -> Option<Arc<dyn Watcher<TestConfig>>> {
            Some(self)
        }
    }

    #[async_trait]
    impl Watcher<TestConfig> for RefusesToWatch {
        async fn watch(
            self: Arc<Self>,
            _cancel: CancellationToken,
            _reporter: Reporter<TestConfig>,
        ) -> std::result::Result<(), SourceError> {
            Err("permission denied".into())
        }
    }

    #[tokio::test]
    async fn test_build_stacks_in_order() {
        let config = StackedConfig::builder(defaults())
            .with_source(port(2000))
            .with_source(port(3000))
            .build()
            .await
            .unwrap();

        assert_eq!(config.get().port, 3000);
        assert_eq!(config.get().host, "localhost");
        assert_eq!(config.snapshot().serial(), 1);
        assert!(!config.is_watching());
    }

    #[tokio::test]
    async fn test_initial_verification() {
        let err = StackedConfig::builder(defaults())
            .with_source(port(80))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, StackError::Verification(_)));

        let config = StackedConfig::builder(defaults())
            .with_source(port(80))
            .skip_initial_verification()
            .build()
            .await
            .unwrap();
        assert_eq!(config.get().port, 80);
    }

    #[tokio::test]
    async fn test_source_failure_aborts_build() {
        let err = StackedConfig::builder(defaults())
            .with_source(port(2000))
            .with_source(Broken)
            .build()
            .await
            .unwrap_err();
        match err {
            StackError::Source { index, name, .. } => {
                assert_eq!(index, 1);
                assert!(name.ends_with("Broken"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_watch_failure_aborts_build() {
        let err = StackedConfig::builder(defaults())
            .with_source(RefusesToWatch)
            .build()
            .await
            .unwrap_err();
        match err {
            StackError::Watch { index, name, source } => {
                assert_eq!(index, 0);
                assert_eq!(name, "refuses");
                assert_eq!(source.to_string(), "permission denied");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_build() {
        let parent = CancellationToken::new();
        parent.cancel();
        let err = StackedConfig::builder(defaults())
            .with_source(port(2000))
            .with_cancellation(&parent)
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, StackError::Cancelled));
    }
}
