//! In-memory source holding one fixed shadow value.

use super::Source;
use crate::copy::deep_copy;
use crate::error::SourceError;
use crate::overlay::shadow_of;
use crate::schema::{Schema, Shadow};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A source that always reports the same value.
///
/// Each request gets its own deep copy, so nothing downstream can reach the
/// stored value.
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
/// let overrides = StaticSource::<AppConfig>::new(
///     "overrides",
///     Some(AppConfigShadow { port: Some(9000), ..Default::default() }),
/// );
/// let everything = StaticSource::from_value("pinned", &AppConfig::default());
/// # let _ = (overrides, everything);
/// ```
pub struct StaticSource<T: Schema> {
    name: String,
    shadow: Shadow<T>,
}

impl<T: Schema> StaticSource<T> {
    /// A source reporting `shadow`.
    pub fn new(name: impl Into<String>, shadow: Shadow<T>) -> Self {
        Self {
            name: name.into(),
            shadow,
        }
    }

    /// A source reporting every exported field of `value` as present.
    pub fn from_value(name: impl Into<String>, value: &T) -> Self {
        Self::new(name, shadow_of(value))
    }
}

#[async_trait]
impl<T: Schema> Source<T> for StaticSource<T> {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn value(&self, _cancel: &CancellationToken) -> Result<Shadow<T>, SourceError> {
        Ok(self.shadow.as_ref().map(deep_copy))
    }
}

impl<T: Schema> std::fmt::Debug for StaticSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticSource")
            .field("name", &self.name)
            .field("shadow", &self.shadow)
            .finish()
    }
}
