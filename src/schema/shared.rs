//! Mutable shared pointers that survive deep copies as aliases.

use super::{FieldKind, FieldPath, Stackable};
use crate::copy::{CopyContext, DeepCopy, deep_copy};
use crate::error::OverlayError;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A shared, interior-mutable pointer.
///
/// Cloning a `Shared` aliases the pointee. Deep copies rebuild the aliasing
/// graph: two fields that point at one `Shared` in the original point at one
/// new `Shared` in the copy, and cycles formed through `Shared` terminate.
///
/// Overlays write through the pointer, so every alias inside one value
/// observes the overlaid fields.
///
/// # Examples
///
/// ```rust
/// use stacked_config::{Shared, deep_copy};
///
/// let pool = Shared::new(vec![1, 2]);
/// let pair = (pool.clone(), pool);
///
/// let copy = deep_copy(&pair);
/// assert!(Shared::ptr_eq(&copy.0, &copy.1));
/// assert!(!Shared::ptr_eq(&copy.0, &pair.0));
///
/// copy.0.write().push(3);
/// assert_eq!(*copy.1.read(), [1, 2, 3]);
/// assert_eq!(*pair.1.read(), [1, 2]);
/// ```
pub struct Shared<T>(Arc<RwLock<T>>);

impl<T> Shared<T> {
    /// Allocate a new pointee.
    pub fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Read the pointee.
    ///
    /// A poisoned lock still yields the value; overlays are the only writers
    /// that report poisoning.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the pointee.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether both pointers alias the same pointee.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.0, &other.0)
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0).cast()
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Default> Default for Shared<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

// Only the address: printing the pointee would not terminate on cycles.
impl<T> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Shared").field(&self.addr()).finish()
    }
}

/// Compares pointees. Comparing two distinct cyclic graphs does not
/// terminate.
impl<T: PartialEq> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other) || *self.read() == *other.read()
    }
}

impl<T> DeepCopy for Shared<T>
where
    T: DeepCopy + Default + Send + Sync + 'static,
{
    fn deep_copy_in(&self, ctx: &mut CopyContext) -> Self {
        if let Some(copy) = ctx.lookup::<Shared<T>>(self.addr()) {
            return copy;
        }
        // Record the new pointer before descending so a cycle back to
        // `self` resolves to it.
        let copy = Shared::new(T::default());
        ctx.remember(self.addr(), &copy);
        let value = self.read().deep_copy_in(ctx);
        *copy.write() = value;
        copy
    }
}

impl<T> Stackable for Shared<T>
where
    T: Stackable + Default,
{
    type Present = T::Present;
    const KIND: FieldKind = FieldKind::Pointer;

    /// Requires an acyclic value.
    fn into_shadow(self) -> Option<T::Present> {
        match Arc::try_unwrap(self.0) {
            Ok(lock) => lock.into_inner().unwrap_or_else(PoisonError::into_inner).into_shadow(),
            Err(shared) => {
                let value = deep_copy(&*Shared(shared).read());
                value.into_shadow()
            }
        }
    }

    fn overlay(&mut self, shadow: Option<T::Present>, path: &mut FieldPath) -> Result<(), OverlayError> {
        let Some(present) = shadow else {
            return Ok(());
        };
        let mut target = self.0.write().map_err(|_| OverlayError::Poisoned {
            path: path.to_string(),
        })?;
        target.overlay(Some(present), path)
    }

    fn materialize(present: T::Present, path: &mut FieldPath) -> Result<Self, OverlayError> {
        T::materialize(present, path).map(Shared::new)
    }
}
