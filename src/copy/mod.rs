//! Structural deep copies that preserve sharing.
//!
//! A deep copy owns no pointee, backing slice or map storage of its input.
//! Two exceptions keep the copy faithful:
//!
//! - Functions and channels are copied by reference. They cannot be
//!   duplicated, so the copy holds the same handle.
//! - Anything reachable twice from the input (through two clones of one
//!   [`Arc`](std::sync::Arc) or [`Shared`](crate::Shared)) is reachable twice
//!   from the copy through one new allocation. Sharing is rebuilt, never
//!   flattened, and reference cycles through `Shared` terminate.
//!
//! The identity table lives in a [`CopyContext`] that spans exactly one copy
//! traversal.

mod impls;

use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Types that can be copied without aliasing any mutable state of the
/// original.
///
/// Most implementations recurse into their parts with the same context.
/// Pointer types consult the context first so that aliases stay aliases.
pub trait DeepCopy: Sized {
    /// Copy `self`, recording and reusing pointer identities in `ctx`.
    fn deep_copy_in(&self, ctx: &mut CopyContext) -> Self;
}

/// Deep-copy a value with a fresh identity table.
///
/// # Examples
///
/// ```rust
/// use stacked_config::deep_copy;
/// use std::sync::Arc;
///
/// let shared = Arc::new(vec![1, 2, 3]);
/// let original = (Arc::clone(&shared), shared);
///
/// let copy = deep_copy(&original);
/// assert_eq!(copy, original);
/// // The copy does not point into the original...
/// assert!(!Arc::ptr_eq(&copy.0, &original.0));
/// // ...but its two paths still share one allocation.
/// assert!(Arc::ptr_eq(&copy.0, &copy.1));
/// ```
pub fn deep_copy<T: DeepCopy>(value: &T) -> T {
    value.deep_copy_in(&mut CopyContext::new())
}

/// Identity table for one deep-copy traversal.
///
/// Entries are keyed by the address of an input allocation together with the
/// type of the pointer that reached it. The type half of the key keeps two
/// differently typed pointers to one address (which boxed values can produce)
/// from resolving to each other's copies.
#[derive(Default)]
pub struct CopyContext {
    seen: HashMap<(usize, TypeId), Box<dyn Any>>,
}

impl CopyContext {
    /// Create an empty identity table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the copy already made for the input allocation at `addr`, if
    /// it was reached before through a pointer of type `P`.
    pub fn lookup<P: Any + Clone>(&self, addr: *const ()) -> Option<P> {
        self.seen
            .get(&(addr as usize, TypeId::of::<P>()))
            .and_then(|copy| copy.downcast_ref::<P>())
            .cloned()
    }

    /// Record `copy` as the copy of the input allocation at `addr`.
    ///
    /// Cycle-capable pointers must call this before recursing into their
    /// pointee.
    pub fn remember<P: Any + Clone>(&mut self, addr: *const (), copy: &P) {
        self.seen
            .insert((addr as usize, TypeId::of::<P>()), Box::new(copy.clone()));
    }

    /// Number of distinct allocations copied so far.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no shared allocation has been copied yet.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl std::fmt::Debug for CopyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyContext")
            .field("seen", &self.seen.len())
            .finish()
    }
}
