//! Presence-aware schema types.
//!
//! Every configuration type has a *shadow*: the form a source uses to report
//! "these fields, not those". For a value of type `T` the shadow is
//! [`Shadow<T>`], an `Option` over `T`'s [`Stackable::Present`] form, so
//! `None` always means "this source says nothing here" and never collides
//! with a zero value such as `0`, `""` or `false`.
//!
//! Structs get their shadow from `#[derive(Stackable)]`, which generates a
//! `<Name>Shadow` struct mirroring every exported field:
//!
//! | field type | shadow field | overlay rule |
//! |---|---|---|
//! | scalar (`u16`, `String`, ...) | `Option<u16>` | assign when present |
//! | text-parsing type (`PathBuf`, `IpAddr`, `#[stack(atomic)]`, enums) | `Option<T>` | assign whole, never recurse |
//! | nested struct `S` | `Option<SShadow>` | recurse field by field |
//! | `Option<S>` / `Box<S>` / `Arc<S>` / `Shared<S>` | `Option<SShadow>` | recurse into the pointee, allocating it if absent |
//! | `Option<u16>` | `Option<u16>` | unchanged: `None` already means absent |
//! | `Vec`, maps, sets, `Arc<[T]>` | `Option<Vec<_>>` ... | replace whole |
//! | `[T; N]` | `Option<[T; N]>` | replace whole |
//! | [`Boxed`] | `Option<Boxed>` | replace, or recurse when both hold one type |
//! | `fn`, [`Handle`], channel senders | dropped | never overlaid |
//!
//! The associated types are resolved by the compiler once per schema type;
//! nothing is inspected at runtime.

mod boxed;
mod handle;
mod impls;
mod path;
mod shared;

pub use boxed::{AnyValue, Boxed, DynValue, Interface};
pub use handle::Handle;
pub use path::FieldPath;
pub use shared::Shared;

use crate::copy::DeepCopy;
use crate::error::{OverlayError, VerifyError};
use std::fmt;

/// The presence-aware form of `T` that sources report.
///
/// `None` is "absent"; `Some` carries the value (or, for structs, the
/// partially populated shadow struct).
pub type Shadow<T> = Option<<T as Stackable>::Present>;

/// How a type takes part in overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Booleans, numbers, characters and strings.
    Scalar,
    /// Types that own their textual representation. Replaced whole.
    Atomic,
    /// Structs with a generated shadow. Overlaid field by field.
    Struct,
    /// Nilable indirection to another stackable type.
    Pointer,
    /// Sequences, maps and sets. Replaced whole.
    Collection,
    /// Fixed-size arrays. Replaced whole.
    Array,
    /// Dynamically typed values held in a [`Boxed`].
    Interface,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scalar => "scalar",
            Self::Atomic => "atomic",
            Self::Struct => "struct",
            Self::Pointer => "pointer",
            Self::Collection => "collection",
            Self::Array => "array",
            Self::Interface => "interface",
        };
        f.write_str(name)
    }
}

/// A type that can be overlaid by a presence-aware shadow.
///
/// Implemented here for std types and generated by `#[derive(Stackable)]`
/// for user structs and enums. Manual implementations are rarely needed.
pub trait Stackable: DeepCopy + fmt::Debug + Send + Sync + 'static {
    /// What a source supplies for this position when it has a value.
    type Present: DeepCopy + fmt::Debug + Send + Sync + 'static;

    /// Overlay behaviour of this type.
    const KIND: FieldKind;

    /// Convert a concrete value into a shadow in which every representable
    /// field is present.
    ///
    /// Overlaying the result onto a default value reproduces `self`, except
    /// for fields the shadow cannot carry (skipped, private, by-reference).
    fn into_shadow(self) -> Option<Self::Present>;

    /// Apply `shadow` onto `self`, leaving `self` untouched where the shadow
    /// is absent.
    ///
    /// # Errors
    ///
    /// Returns an [`OverlayError`] naming `path` when a field cannot be set.
    fn overlay(
        &mut self,
        shadow: Option<Self::Present>,
        path: &mut FieldPath,
    ) -> Result<(), OverlayError>;

    /// Build a value from a present shadow, starting from the type's zero
    /// value where it needs one.
    ///
    /// # Errors
    ///
    /// Propagates overlay errors from nested fields.
    fn materialize(present: Self::Present, path: &mut FieldPath) -> Result<Self, OverlayError>;
}

/// Metadata for one field of a [`Schema`]'s shadow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field name, or its position for tuple structs.
    pub name: &'static str,
    /// Overlay behaviour of the field's type.
    pub kind: FieldKind,
    /// The field's type as written in the schema.
    pub type_name: &'static str,
}

/// A struct that can be the root of a stacked configuration.
///
/// Derived together with [`Stackable`] for every struct. The shadow of a
/// schema is what sources report.
///
/// # Examples
///
/// ```rust
/// use stacked_config::{Schema, Stackable, FieldKind};
///
/// #[derive(Debug, Default, Clone, PartialEq, Stackable)]
/// struct ServerConfig {
///     pub port: u16,
///     pub tags: Vec<String>,
/// }
///
/// let names: Vec<_> = ServerConfig::FIELDS.iter().map(|f| f.name).collect();
/// assert_eq!(names, ["port", "tags"]);
/// assert_eq!(ServerConfig::FIELDS[1].kind, FieldKind::Collection);
/// ```
pub trait Schema: Stackable + Default {
    /// The fields a source can set, in declaration order.
    const FIELDS: &'static [FieldInfo];

    /// Check the merged value after every stacking pass.
    ///
    /// The derive routes this to the type's [`crate::Verify`] impl when the
    /// struct carries `#[stack(verify)]`; otherwise every value passes.
    ///
    /// # Errors
    ///
    /// Returns a [`VerifyError`] when the value must not be published.
    fn verify(&self) -> Result<(), VerifyError> {
        Ok(())
    }

    /// Look up a field by name.
    fn field(name: &str) -> Option<&'static FieldInfo> {
        Self::FIELDS.iter().find(|info| info.name == name)
    }
}
