use crate::model::{Scope, TypeName, WidgetKind};

/// Failure reported by the transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP {status}: {}", .messages.join("; "))]
    Http { status: u16, messages: Vec<String> },

    #[error("network error: {0}")]
    Network(String),

    #[error("could not decode response: {0}")]
    Decode(String),
}

/// Why live type discovery could not be used. Never returned to callers;
/// it only ends up in the catalog's health record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    #[error("discovery disabled by configuration")]
    Disabled,

    #[error("no accessible project to discover types from")]
    NoProject,

    #[error("project {0} reported no work item types")]
    Empty(String),

    #[error("discovery query failed: {0}")]
    Transport(#[from] TransportError),

    #[error("unexpected discovery response: {0}")]
    Schema(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("unknown work item type: {input:?}")]
    UnknownType { input: String },

    #[error("work item type catalog has not been initialized")]
    NotInitialized,
}

/// Caller-input problems. Always raised before any mutation is sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{type_name} must be addressed by a {required} path, got a {actual} path")]
    ScopeMismatch {
        type_name: TypeName,
        required: Scope,
        actual: Scope,
    },

    #[error("{type_name} does not support the {widget} widget")]
    UnsupportedWidget {
        type_name: TypeName,
        widget: WidgetKind,
    },

    #[error("conflicting {widget} operations: {detail}")]
    ConflictingOperation { widget: WidgetKind, detail: String },

    #[error("invalid state transition: {requested:?} (expected close or reopen)")]
    InvalidStateTransition { requested: String },

    #[error("invalid {widget} value: {detail}")]
    InvalidValue { widget: WidgetKind, detail: String },

    #[error("{widget} change cannot be applied when creating a work item")]
    NotApplicableOnCreate { widget: WidgetKind },

    #[error("{parent} cannot be the parent of {child}")]
    HierarchyViolation { parent: TypeName, child: TypeName },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("transport failure: {0}")]
    Transport(TransportError),

    /// The outcome of a timed-out mutation is unknown; re-query to learn the remote state.
    #[error("request timed out; remote state is unknown")]
    Timeout,

    #[error("backend rejected the request: {}", .messages.join("; "))]
    BackendRejected { messages: Vec<String> },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<TransportError> for EngineError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => EngineError::Timeout,
            other => EngineError::Transport(other),
        }
    }
}

impl EngineError {
    /// Infrastructure failures a caller may choose to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transport(_) | EngineError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_timeout_maps_to_engine_timeout() {
        let err: EngineError = TransportError::Timeout.into();
        assert!(matches!(err, EngineError::Timeout));
        assert!(err.is_retryable());
    }

    #[test]
    fn validation_errors_are_not_retryable() {
        let err: EngineError = ValidationError::InvalidStateTransition {
            requested: "merged".into(),
        }
        .into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn http_error_lists_messages() {
        let err = TransportError::Http {
            status: 401,
            messages: vec!["unauthorized".into(), "token expired".into()],
        };
        assert_eq!(err.to_string(), "HTTP 401: unauthorized; token expired");
    }

    #[test]
    fn scope_mismatch_message_names_both_scopes() {
        let err = ValidationError::ScopeMismatch {
            type_name: TypeName::Epic,
            required: Scope::Group,
            actual: Scope::Project,
        };
        assert_eq!(
            err.to_string(),
            "EPIC must be addressed by a GROUP path, got a PROJECT path"
        );
    }
}
