//! Source, watcher and decoder capabilities.

use crate::error::SourceError;
use crate::notify::Reporter;
use crate::schema::{Schema, Shadow};
use async_trait::async_trait;
use std::io::Read;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A producer of shadow values for schema `T`.
///
/// Sources are consulted in precedence order: a field set by a later source
/// overrides the same field set by an earlier one.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use stacked_config::prelude::*;
/// use tokio_util::sync::CancellationToken;
///
/// #[derive(Debug, Default, Clone, PartialEq, Stackable)]
/// struct AppConfig {
///     pub port: u16,
/// }
///
/// struct FixedPort(u16);
///
/// #[async_trait]
/// impl Source<AppConfig> for FixedPort {
///     fn name(&self) -> String {
///         "fixed-port".into()
///     }
///
///     async fn value(
///         &self,
///         _cancel: &CancellationToken,
///     ) -> std::result::Result<Shadow<AppConfig>, SourceError> {
///         Ok(Some(AppConfigShadow { port: Some(self.0) }))
///     }
/// }
/// ```
#[async_trait]
pub trait Source<T: Schema>: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }

    /// The source's current value.
    ///
    /// Called once per recomputation need. Must not leave background work
    /// running; that belongs in [`Watcher::watch`].
    ///
    /// # Errors
    ///
    /// Returns the collaborator's failure. At construction this aborts the
    /// build.
    async fn value(&self, cancel: &CancellationToken) -> Result<Shadow<T>, SourceError>;

    /// This source as a [`Watcher`], if it reports changes.
    fn as_watcher(self: Arc<Self>) -> Option<Arc<dyn Watcher<T>>> {
        None
    }
}

/// A source that reports changes after construction.
#[async_trait]
pub trait Watcher<T: Schema>: Source<T> {
    /// Start reporting through `reporter`.
    ///
    /// Spawn whatever background work is needed and return; the work should
    /// stop once `cancel` fires and call [`Reporter::done`] when the source
    /// will never report again.
    ///
    /// # Errors
    ///
    /// A failure to start aborts construction.
    async fn watch(
        self: Arc<Self>,
        cancel: CancellationToken,
        reporter: Reporter<T>,
    ) -> Result<(), SourceError>;
}

/// Turns a byte stream into a shadow value.
///
/// Any `Fn(&mut dyn Read) -> Result<Shadow<T>, SourceError>` is a decoder.
pub trait Decoder<T: Schema>: Send + Sync {
    /// Decode one value from `input`.
    ///
    /// # Errors
    ///
    /// Returns the format's parse failure.
    fn decode(&self, input: &mut dyn Read) -> Result<Shadow<T>, SourceError>;
}

impl<T, F> Decoder<T> for F
where
    T: Schema,
    F: Fn(&mut dyn Read) -> Result<Shadow<T>, SourceError> + Send + Sync,
{
    fn decode(&self, input: &mut dyn Read) -> Result<Shadow<T>, SourceError> {
        self(input)
    }
}
