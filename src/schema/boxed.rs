//! Dynamically typed configuration values.
//!
//! A [`Boxed`] field holds any stackable value admitted by its
//! [`Interface`]. Overlays replace the boxed value unless base and overlay
//! hold the same concrete type, in which case the overlay recurses into it.

use super::{FieldKind, FieldPath, Stackable};
use crate::copy::{CopyContext, DeepCopy};
use crate::error::OverlayError;
use std::any::{Any, type_name};
use std::fmt;
use std::marker::PhantomData;

/// The set of concrete types a [`Boxed`] field accepts.
///
/// # Examples
///
/// ```rust
/// use stacked_config::{Boxed, DynValue, Interface};
///
/// enum Numeric {}
///
/// impl Interface for Numeric {
///     const NAME: &'static str = "Numeric";
///
///     fn admits(value: &dyn DynValue) -> bool {
///         value.as_any().is::<u64>() || value.as_any().is::<f64>()
///     }
/// }
///
/// let limit: Boxed<Numeric> = Boxed::new(5u64);
/// assert!(limit.is_admitted());
/// assert!(!Boxed::<Numeric>::new(String::from("five")).is_admitted());
/// ```
pub trait Interface: Send + Sync + 'static {
    /// Name used in overlay errors.
    const NAME: &'static str;

    /// Whether `value`'s concrete type satisfies this interface.
    fn admits(value: &dyn DynValue) -> bool;
}

/// The interface every stackable value satisfies.
#[derive(Debug)]
pub enum AnyValue {}

impl Interface for AnyValue {
    const NAME: &'static str = "any";

    fn admits(_value: &dyn DynValue) -> bool {
        true
    }
}

/// Object-safe view of a [`Stackable`] value.
///
/// Implemented for every `Stackable + PartialEq` type.
pub trait DynValue: Any + Send + Sync + fmt::Debug {
    /// Borrow as [`Any`] for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Mutably borrow as [`Any`] for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Convert into [`Any`] for downcasting by value.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// The concrete type's name.
    fn type_name(&self) -> &'static str;

    /// Overlay behaviour of the concrete type.
    fn kind(&self) -> FieldKind;

    /// Deep-copy the value within an ongoing traversal.
    fn copy_boxed(&self, ctx: &mut CopyContext) -> Box<dyn DynValue>;

    /// Overlay a value of the same concrete type onto this one.
    ///
    /// # Errors
    ///
    /// [`OverlayError::Incompatible`] when `other` has a different type, or
    /// whatever the concrete overlay reports.
    fn overlay_boxed(
        &mut self,
        other: Box<dyn DynValue>,
        path: &mut FieldPath,
    ) -> Result<(), OverlayError>;

    /// Equality across the type erasure.
    fn eq_boxed(&self, other: &dyn DynValue) -> bool;
}

impl<T: Stackable + PartialEq> DynValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn kind(&self) -> FieldKind {
        T::KIND
    }

    fn copy_boxed(&self, ctx: &mut CopyContext) -> Box<dyn DynValue> {
        Box::new(self.deep_copy_in(ctx))
    }

    fn overlay_boxed(
        &mut self,
        other: Box<dyn DynValue>,
        path: &mut FieldPath,
    ) -> Result<(), OverlayError> {
        let found = other.type_name();
        match other.into_any().downcast::<T>() {
            Ok(value) => self.overlay((*value).into_shadow(), path),
            Err(_) => Err(OverlayError::Incompatible {
                path: path.to_string(),
                expected: type_name::<T>(),
                found,
            }),
        }
    }

    fn eq_boxed(&self, other: &dyn DynValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }
}

/// An optional, dynamically typed value restricted to interface `I`.
///
/// The empty box is the zero value and, as an overlay, means "absent".
pub struct Boxed<I: Interface = AnyValue> {
    value: Option<Box<dyn DynValue>>,
    _interface: PhantomData<fn() -> I>,
}

impl<I: Interface> Boxed<I> {
    /// Box a value. Whether `I` admits it is checked when it is overlaid.
    pub fn new<T: Stackable + PartialEq>(value: T) -> Self {
        Self {
            value: Some(Box::new(value)),
            _interface: PhantomData,
        }
    }

    /// The empty box.
    pub fn empty() -> Self {
        Self {
            value: None,
            _interface: PhantomData,
        }
    }

    /// Whether the box is empty.
    pub fn is_none(&self) -> bool {
        self.value.is_none()
    }

    /// Whether the box holds a value.
    pub fn is_some(&self) -> bool {
        self.value.is_some()
    }

    /// Whether the box is empty or holds a value `I` admits.
    pub fn is_admitted(&self) -> bool {
        self.value.as_deref().is_none_or(I::admits)
    }

    /// The held value's concrete type name.
    pub fn type_name(&self) -> Option<&'static str> {
        self.value.as_deref().map(DynValue::type_name)
    }

    /// Borrow the held value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.as_deref()?.as_any().downcast_ref()
    }

    /// Mutably borrow the held value as `T`.
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.value.as_deref_mut()?.as_any_mut().downcast_mut()
    }

    /// Borrow the held value.
    pub fn as_dyn(&self) -> Option<&dyn DynValue> {
        self.value.as_deref()
    }
}

impl<I: Interface> Default for Boxed<I> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<I: Interface> Clone for Boxed<I> {
    fn clone(&self) -> Self {
        crate::deep_copy(self)
    }
}

impl<I: Interface> fmt::Debug for Boxed<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => f.debug_tuple("Boxed").field(value).finish(),
            None => f.write_str("Boxed(<empty>)"),
        }
    }
}

impl<I: Interface> PartialEq for Boxed<I> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.value, &other.value) {
            (None, None) => true,
            (Some(a), Some(b)) => a.eq_boxed(&**b),
            _ => false,
        }
    }
}

impl<I: Interface> DeepCopy for Boxed<I> {
    fn deep_copy_in(&self, ctx: &mut CopyContext) -> Self {
        Self {
            value: self.value.as_ref().map(|value| value.copy_boxed(ctx)),
            _interface: PhantomData,
        }
    }
}

impl<I: Interface> Stackable for Boxed<I> {
    type Present = Self;
    const KIND: FieldKind = FieldKind::Interface;

    fn into_shadow(self) -> Option<Self> {
        self.is_some().then_some(self)
    }

    fn overlay(&mut self, shadow: Option<Self>, path: &mut FieldPath) -> Result<(), OverlayError> {
        let Some(incoming) = shadow.and_then(|boxed| boxed.value) else {
            return Ok(());
        };
        if !I::admits(&*incoming) {
            return Err(OverlayError::NotImplemented {
                path: path.to_string(),
                interface: I::NAME,
                found: incoming.type_name(),
            });
        }

        let same_type = self
            .value
            .as_ref()
            .is_some_and(|current| current.as_any().type_id() == incoming.as_any().type_id());
        if same_type {
            if let Some(current) = self.value.as_mut() {
                return current.overlay_boxed(incoming, path);
            }
        }
        self.value = Some(incoming);
        Ok(())
    }

    fn materialize(present: Self, path: &mut FieldPath) -> Result<Self, OverlayError> {
        let mut out = Self::empty();
        out.overlay(Some(present), path)?;
        Ok(out)
    }
}
