//! OpenTelemetry metrics for stacking and notification.
//!
//! Tracks:
//! - Recomputation attempts, successes and failures
//! - Recomputation duration
//! - Verification failures
//! - Events dropped by a full events channel
//! - Active callbacks
//! - The published serial
//!
//! # Examples
//!
//! ```rust,no_run
//! use opentelemetry::global;
//! use stacked_config::prelude::*;
//!
//! #[derive(Debug, Default, Clone, PartialEq, Stackable)]
//! struct AppConfig {
//!     pub port: u16,
//! }
//!
//! # async fn example() -> Result<()> {
//! let config = StackedConfig::builder(AppConfig::default())
//!     .with_metrics(global::meter("my-app"))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod stack_metrics;

pub use stack_metrics::StackMetrics;
