//! Stacking and the configuration handle.

mod builder;
mod config_handle;
pub(crate) mod stacker;

#[cfg(feature = "verification")]
mod validation;

pub use builder::StackedConfigBuilder;
pub use config_handle::{Snapshot, StackedConfig};
pub use stacker::stack;

#[cfg(feature = "verification")]
pub use validation::Verify;
