//! Error types for freezing.

use crate::config::ConfigError;
use crate::snapshot::SnapshotError;
use thiserror::Error;

/// No handler is registered for any type in a value's resolution order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no freeze handler registered for type `{type_name}` or any of its bases")]
pub struct DispatchError {
    /// Qualified name of the value's most derived type.
    pub type_name: String,
}

/// Errors raised by [`crate::freeze`] and [`crate::Freezer::freeze`].
#[derive(Debug, Error)]
pub enum FreezeError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Nesting went deeper than the configured ceiling.
    #[error("recursion limit {limit} exceeded while freezing {}", .path.join(" -> "))]
    RecursionLimit {
        limit: usize,
        /// Type names from the root down to the offending value.
        path: Vec<String>,
    },

    #[error("cannot freeze value of type `{type_name}`: {reason}")]
    Unfreezable { type_name: String, reason: String },

    /// The thread's default freezer was used from inside a handler or hook.
    #[error("the default freezer is already in use on this thread")]
    Reentrant,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl FreezeError {
    pub(crate) fn unfreezable(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        FreezeError::Unfreezable {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by an [`crate::ObjectProtocol`] implementation.
///
/// `Type` and `Import` mean "this object does not support the recipe" and
/// make the object handler fall back to its attribute form. `Other` aborts
/// the freeze.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("type error: {0}")]
    Type(String),
    #[error("import error: {0}")]
    Import(String),
    #[error("{0}")]
    Other(String),
}

impl ProtocolError {
    /// True for the errors that degrade to the fallback form.
    pub fn is_decline(&self) -> bool {
        matches!(self, ProtocolError::Type(_) | ProtocolError::Import(_))
    }
}

/// Class construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassError {
    /// The bases admit no C3 linearization.
    #[error("cannot create a consistent method resolution order for class `{0}`")]
    InconsistentMro(String),
    #[error("duplicate base class `{0}`")]
    DuplicateBase(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recursion_limit_message_lists_path() {
        let err = FreezeError::RecursionLimit {
            limit: 2,
            path: vec!["list".into(), "list".into(), "list".into()],
        };
        assert_eq!(
            err.to_string(),
            "recursion limit 2 exceeded while freezing list -> list -> list"
        );
    }

    #[test]
    fn declines_are_type_and_import() {
        assert!(ProtocolError::Type("x".into()).is_decline());
        assert!(ProtocolError::Import("x".into()).is_decline());
        assert!(!ProtocolError::Other("x".into()).is_decline());
    }

    #[test]
    fn dispatch_error_converts() {
        let err: FreezeError = DispatchError {
            type_name: "mod.Thing".into(),
        }
        .into();
        assert!(matches!(err, FreezeError::Dispatch(_)));
        assert!(err.to_string().contains("mod.Thing"));
    }
}
