//! Source capabilities and in-memory sources.
//!
//! Concrete file, environment and flag sources live outside this crate; they
//! plug in by implementing [`Source`] and, when they can report changes,
//! [`Watcher`].

mod decoded;
mod deferred;
mod push;
mod source;
mod static_source;

pub use decoded::DecodedSource;
pub use deferred::DeferredSource;
pub use push::{Publisher, PushSource};
pub use source::{Decoder, Source, Watcher};
pub use static_source::StaticSource;
