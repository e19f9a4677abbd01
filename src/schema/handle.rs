//! Function-valued configuration fields.

use crate::copy::{CopyContext, DeepCopy};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// A shared function value, such as a closure hook stored in a config.
///
/// Deep copies keep the same function. Handles are not overlaid, so a
/// schema field of this type keeps whatever value the defaults gave it.
///
/// # Examples
///
/// ```rust
/// use stacked_config::{Handle, deep_copy};
///
/// use std::sync::Arc;
///
/// type Hook = dyn Fn(u32) -> u32 + Send + Sync;
///
/// let f: Arc<Hook> = Arc::new(|x: u32| x + 1);
/// let hook = Handle::from_arc(f);
/// let copy = deep_copy(&hook);
/// assert!(Handle::ptr_eq(&copy, &hook));
/// assert_eq!((*copy)(1), 2);
/// ```
pub struct Handle<F: ?Sized>(Arc<F>);

impl<F> Handle<F> {
    /// Wrap a sized function value.
    pub fn new(f: F) -> Self {
        Self(Arc::new(f))
    }
}

impl<F: ?Sized> Handle<F> {
    /// Wrap an already shared (typically unsized) function value.
    pub fn from_arc(f: Arc<F>) -> Self {
        Self(f)
    }

    /// Whether both handles refer to the same function value.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&this.0), Arc::as_ptr(&other.0))
    }
}

impl<F: ?Sized> From<Arc<F>> for Handle<F> {
    fn from(f: Arc<F>) -> Self {
        Self(f)
    }
}

impl<F: ?Sized> Deref for Handle<F> {
    type Target = F;

    fn deref(&self) -> &F {
        &self.0
    }
}

impl<F: ?Sized> Clone for Handle<F> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<F: ?Sized> DeepCopy for Handle<F> {
    fn deep_copy_in(&self, _ctx: &mut CopyContext) -> Self {
        self.clone()
    }
}

impl<F: ?Sized> PartialEq for Handle<F> {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl<F: ?Sized> fmt::Debug for Handle<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}
