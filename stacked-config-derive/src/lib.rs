//! Derive macro for `stacked_config::Stackable`.
//!
//! For a struct `Config`, `#[derive(Stackable)]` generates:
//!
//! - `ConfigShadow`, a struct with one `Option<_>` field per exported field
//!   of `Config`, each holding that field's presence-aware form;
//! - `DeepCopy` for both structs;
//! - `Stackable` for `Config`, overlaying field by field;
//! - `Schema` for `Config`, listing the shadowed fields.
//!
//! Enums and structs marked `#[stack(atomic)]` are replaced whole: their
//! shadow is the value itself and no shadow struct is generated.
//!
//! # Attributes
//!
//! Container: `atomic`, `verify`, `shadow = "Name"`, `derive(...)` (extra
//! derives for the shadow) and `crate = "path"`.
//!
//! Field: `skip` (deep-copied but never overlaid) and `by_ref` (cloned and
//! never overlaid). Function pointers, `Handle`, `Arc<dyn _>`, channel
//! senders and `PhantomData` are `by_ref` without the attribute. Private
//! fields are never overlaid.

mod expand;
mod parse;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Derive `Stackable`, `DeepCopy` and, for structs, `Schema`.
#[proc_macro_derive(Stackable, attributes(stack))]
pub fn derive_stackable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match parse::parse_input(&input) {
        Ok(parsed) => expand::expand(&parsed).into(),
        Err(err) => err.to_compile_error().into(),
    }
}
