//! Configuration verification support.

use crate::error::VerifyError;

/// Trait for verifying a merged configuration.
///
/// Implement this on a schema and mark it `#[stack(verify)]` to have it run
/// after every stacking pass. A value that fails verification is never
/// published: construction fails, or a watch-driven update is rejected and
/// the previous snapshot stays current.
///
/// Verification runs on the recomputation path, so keep it cheap and
/// non-blocking.
///
/// # Examples
///
/// ```rust
/// use stacked_config::{Stackable, Verify, VerifyError, stack};
///
/// #[derive(Debug, Default, Clone, Stackable)]
/// #[stack(verify)]
/// struct ServerConfig {
///     pub port: u16,
///     pub max_connections: usize,
/// }
///
/// impl Verify for ServerConfig {
///     fn verify(&self) -> Result<(), VerifyError> {
///         let mut errors = Vec::new();
///         if self.port < 1024 {
///             errors.push(VerifyError::invalid_field(
///                 "port",
///                 "must be >= 1024 (privileged ports require root)",
///             ));
///         }
///         if self.max_connections == 0 {
///             errors.push(VerifyError::invalid_field(
///                 "max_connections",
///                 "must be greater than 0",
///             ));
///         }
///         VerifyError::from_all(errors)
///     }
/// }
///
/// let defaults = ServerConfig { port: 8080, max_connections: 10 };
/// let bad = ServerConfigShadow { port: Some(80), ..Default::default() };
/// assert!(stack(&defaults, &[Some(bad)]).is_err());
/// ```
pub trait Verify {
    /// Verify the configuration.
    ///
    /// # Errors
    ///
    /// Should return a `VerifyError` describing what verification failed.
    fn verify(&self) -> Result<(), VerifyError>;
}
