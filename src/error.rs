//! Error types for stacked-config.

use std::fmt;

/// Result type alias for stacked-config operations.
pub type Result<T> = std::result::Result<T, StackError>;

/// Error reported by a source collaborator.
///
/// Sources are external to this crate, so their failures are carried as
/// opaque boxed errors.
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while stacking or watching configuration.
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    /// A source failed to produce its value.
    #[error("source #{index} ({name}) failed to produce a value: {source}")]
    Source {
        /// Position of the source in precedence order
        index: usize,
        /// Name reported by the source
        name: String,
        /// The underlying failure
        #[source]
        source: SourceError,
    },

    /// Overlaying a source's value onto the running base failed.
    #[error("failed to overlay source #{index} ({name}): {source}")]
    Overlay {
        /// Position of the source in precedence order
        index: usize,
        /// Name reported by the source
        name: String,
        /// The underlying failure
        #[source]
        source: OverlayError,
    },

    /// The merged value was rejected by its own verification.
    #[error("configuration verification failed: {0}")]
    Verification(#[from] VerifyError),

    /// A watching source refused to start watching.
    #[error("source #{index} ({name}) failed to start watching: {source}")]
    Watch {
        /// Position of the source in precedence order
        index: usize,
        /// Name reported by the source
        name: String,
        /// The underlying failure
        #[source]
        source: SourceError,
    },

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// The coordinator has stopped and accepts no more requests.
    #[error("configuration coordinator has stopped")]
    Stopped,
}

/// Errors raised while overlaying a shadow value onto a base value.
///
/// Every variant carries the dotted path of the field that could not be set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OverlayError {
    /// A boxed value does not satisfy the interface of the field it targets.
    #[error("`{path}`: {found} does not implement interface `{interface}`")]
    NotImplemented {
        /// Field path
        path: String,
        /// Name of the field's interface
        interface: &'static str,
        /// Type name of the rejected value
        found: &'static str,
    },

    /// A boxed value could not be unboxed as the type it claimed to be.
    #[error("`{path}`: expected {expected}, found {found}")]
    Incompatible {
        /// Field path
        path: String,
        /// Type name of the base value
        expected: &'static str,
        /// Type name of the overlay value
        found: &'static str,
    },

    /// A shared pointee's lock was poisoned, so the field cannot be set.
    #[error("`{path}`: cannot set field, lock poisoned")]
    Poisoned {
        /// Field path
        path: String,
    },
}

/// Verification error returned by [`crate::Verify`] implementations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Custom verification error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name/path
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple verification errors occurred.
    Multiple(Vec<VerifyError>),
}

impl VerifyError {
    /// Create a custom verification error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Collapse a list of errors: `Ok` when empty, the sole error when there
    /// is exactly one, `Multiple` otherwise.
    pub fn from_all(mut errors: Vec<VerifyError>) -> std::result::Result<(), Self> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple verification errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for VerifyError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_error_display() {
        let err = VerifyError::invalid_field("server.port", "must be >= 1024");
        assert_eq!(err.to_string(), "Field 'server.port' is invalid: must be >= 1024");
    }

    #[test]
    fn test_from_all() {
        assert!(VerifyError::from_all(vec![]).is_ok());

        let single = VerifyError::from_all(vec![VerifyError::custom("one")]).unwrap_err();
        assert_eq!(single, VerifyError::custom("one"));

        let many = VerifyError::from_all(vec![
            VerifyError::custom("one"),
            VerifyError::custom("two"),
        ])
        .unwrap_err();
        assert!(matches!(many, VerifyError::Multiple(ref v) if v.len() == 2));
        assert!(many.to_string().contains("2. two"));
    }

    #[test]
    fn test_overlay_error_mentions_path() {
        let err = OverlayError::NotImplemented {
            path: "plugin.settings".to_string(),
            interface: "numeric",
            found: "alloc::string::String",
        };
        let msg = err.to_string();
        assert!(msg.contains("plugin.settings"));
        assert!(msg.contains("numeric"));
    }

    #[test]
    fn test_stack_error_from_verify() {
        let err: StackError = VerifyError::custom("bad").into();
        assert!(matches!(err, StackError::Verification(_)));
    }
}
