//! # stacked-config
//!
//! Typed configuration stacking: overlay ordered sources onto defaults and
//! republish on every change.
//!
//! ## Overview
//!
//! A schema is a plain struct deriving [`Stackable`]. The derive generates a
//! shadow struct in which every field is optional, so a source can say which
//! fields it sets. Building a [`StackedConfig`]:
//!
//! 1. asks each source for its shadow value, in precedence order;
//! 2. deep-copies the defaults and overlays every shadow onto the copy;
//! 3. runs the schema's verification, if it has one;
//! 4. publishes the result as an immutable [`Snapshot`].
//!
//! When a source watches, a background coordinator repeats the whole
//! pipeline from the defaults on every report and publishes the new value
//! to lock-free readers, an events channel and registered callbacks.
//!
//! ## Quick Start
//!
//! ```rust
//! use stacked_config::prelude::*;
//!
//! #[derive(Debug, Default, Clone, PartialEq, Stackable)]
//! struct ServerConfig {
//!     pub port: u16,
//! }
//!
//! #[derive(Debug, Default, Clone, PartialEq, Stackable)]
//! struct AppConfig {
//!     pub server: ServerConfig,
//!     pub database_url: String,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<()> {
//! let defaults = AppConfig {
//!     server: ServerConfig { port: 8080 },
//!     database_url: "postgres://localhost/app".into(),
//! };
//!
//! let config = StackedConfig::builder(defaults)
//!     .with_source(StaticSource::<AppConfig>::new(
//!         "env",
//!         Some(AppConfigShadow {
//!             server: Some(ServerConfigShadow { port: Some(9090) }),
//!             ..Default::default()
//!         }),
//!     ))
//!     .build()
//!     .await?;
//!
//! let cfg = config.get();
//! assert_eq!(cfg.server.port, 9090);
//! assert_eq!(cfg.database_url, "postgres://localhost/app");
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `verification` (default): the [`Verify`] trait and `#[stack(verify)]`
//! - `metrics`: OpenTelemetry instruments via
//!   [`StackedConfigBuilder::with_metrics`]

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

extern crate self as stacked_config;

pub mod copy;
pub mod core;
pub mod error;
pub mod notify;
pub mod overlay;
pub mod schema;
pub mod sources;

#[cfg(feature = "metrics")]
pub mod metrics;

pub use copy::{CopyContext, DeepCopy, deep_copy};
pub use crate::core::{Snapshot, StackedConfig, StackedConfigBuilder, stack};
pub use error::{OverlayError, Result, SourceError, StackError, VerifyError};
pub use notify::{CallbackHandle, Reporter};
pub use overlay::{overlay, shadow_of};
pub use schema::{
    AnyValue, Boxed, DynValue, FieldInfo, FieldKind, FieldPath, Handle, Interface, Schema,
    Shadow, Shared, Stackable,
};
pub use stacked_config_derive::Stackable;

#[cfg(feature = "verification")]
pub use crate::core::Verify;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{Snapshot, StackedConfig, StackedConfigBuilder};
    pub use crate::error::{Result, SourceError, StackError, VerifyError};
    pub use crate::schema::{Boxed, Schema, Shadow, Shared, Stackable};
    pub use crate::sources::{
        DecodedSource, DeferredSource, Publisher, PushSource, Source, StaticSource, Watcher,
    };
    pub use stacked_config_derive::Stackable;

    #[cfg(feature = "verification")]
    pub use crate::core::Verify;
}
