//! Stacking: deep-copied defaults overlaid by every source in order.

use crate::copy::deep_copy;
use crate::error::{Result, StackError};
use crate::schema::{FieldPath, Schema, Shadow};
use tracing::trace;

/// A stacking pass that did not produce a publishable value.
pub(crate) struct Rejected<T> {
    /// Why the pass failed.
    pub error: StackError,
    /// The merged value, when stacking completed but verification refused it.
    pub attempted: Option<T>,
}

/// Recomputes a configuration from its defaults and per-source snapshots.
///
/// Every pass starts again from a fresh copy of the defaults. A field no
/// source reports therefore reverts to its default, even if an earlier pass
/// had it set.
pub(crate) struct Stacker<T> {
    defaults: T,
    names: Vec<String>,
}

impl<T: Schema> Stacker<T> {
    /// Create a stacker over a private copy of `defaults`.
    ///
    /// `names` labels sources in errors, in precedence order.
    pub(crate) fn new(defaults: &T, names: Vec<String>) -> Self {
        Self {
            defaults: deep_copy(defaults),
            names,
        }
    }

    pub(crate) fn name(&self, index: usize) -> String {
        self.names
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("snapshot {index}"))
    }

    /// Overlay `snapshots` in order onto a copy of the defaults and, when
    /// `verify` is set, verify the result.
    ///
    /// Snapshots are copied before they are overlaid, so the caller's table
    /// is never mutated or aliased by the result.
    pub(crate) fn stack(
        &self,
        snapshots: &[Shadow<T>],
        verify: bool,
    ) -> std::result::Result<T, Rejected<T>> {
        let mut base = deep_copy(&self.defaults);
        for (index, snapshot) in snapshots.iter().enumerate() {
            trace!(index, present = snapshot.is_some(), "overlaying source");
            let shadow = snapshot.as_ref().map(deep_copy);
            if let Err(source) = base.overlay(shadow, &mut FieldPath::root()) {
                return Err(Rejected {
                    error: StackError::Overlay {
                        index,
                        name: self.name(index),
                        source,
                    },
                    attempted: None,
                });
            }
        }

        if verify {
            if let Err(err) = base.verify() {
                return Err(Rejected {
                    error: err.into(),
                    attempted: Some(base),
                });
            }
        }
        Ok(base)
    }
}

/// Stack `snapshots` onto `defaults` once and verify the result.
///
/// This is the stateless form of what a [`crate::StackedConfig`] does on
/// every change.
///
/// # Errors
///
/// Returns [`StackError::Overlay`] when a snapshot cannot be overlaid and
/// [`StackError::Verification`] when the merged value fails
/// [`Schema::verify`].
///
/// # Examples
///
/// ```rust
/// use stacked_config::{Stackable, stack};
///
/// #[derive(Debug, Default, Clone, PartialEq, Stackable)]
/// struct AppConfig {
///     pub host: String,
///     pub port: u16,
/// }
///
/// let defaults = AppConfig { host: "localhost".into(), port: 8080 };
/// let file = AppConfigShadow { host: Some("db.internal".into()), port: Some(5432) };
/// let env = AppConfigShadow { port: Some(6432), ..Default::default() };
///
/// let merged = stack(&defaults, &[Some(file), None, Some(env)])?;
/// assert_eq!(merged, AppConfig { host: "db.internal".into(), port: 6432 });
/// # Ok::<(), stacked_config::StackError>(())
/// ```
pub fn stack<T: Schema>(defaults: &T, snapshots: &[Shadow<T>]) -> Result<T> {
    Stacker::new(defaults, Vec::new())
        .stack(snapshots, true)
        .map_err(|rejected| rejected.error)
}
