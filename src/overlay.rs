//! Presence-aware overlays.
//!
//! [`overlay`] applies a shadow to a concrete value in place: present
//! fields are assigned, absent fields are left alone, nested structs and
//! pointer targets are recursed into. See [`crate::schema`] for the
//! per-kind rules.

use crate::copy::deep_copy;
use crate::error::OverlayError;
use crate::schema::{FieldPath, Shadow, Stackable};

/// Overlay `shadow` onto `base`.
///
/// On error `base` may be partially overlaid; callers that need the old
/// value must overlay a copy.
///
/// # Errors
///
/// Returns an [`OverlayError`] naming the field path that could not be set,
/// for example a boxed value whose type the field's interface does not
/// admit.
///
/// # Examples
///
/// ```rust
/// use stacked_config::{Stackable, overlay};
///
/// #[derive(Debug, Default, Clone, PartialEq, Stackable)]
/// struct Limits {
///     pub max_conns: u32,
///     pub burst: Option<u32>,
/// }
///
/// let mut base = Limits { max_conns: 10, burst: Some(5) };
/// overlay(&mut base, Some(LimitsShadow { max_conns: Some(0), burst: None }))?;
/// assert_eq!(base, Limits { max_conns: 0, burst: Some(5) });
/// # Ok::<(), stacked_config::OverlayError>(())
/// ```
pub fn overlay<T: Stackable>(base: &mut T, shadow: Shadow<T>) -> Result<(), OverlayError> {
    base.overlay(shadow, &mut FieldPath::root())
}

/// Produce the shadow of a concrete value: every representable field
/// present, nothing aliasing `value`.
///
/// Overlaying the result onto `T::default()` yields a value equal to
/// `value` in every field a shadow can carry.
pub fn shadow_of<T: Stackable>(value: &T) -> Shadow<T> {
    deep_copy(value).into_shadow()
}
