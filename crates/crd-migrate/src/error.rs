//! Error types for custom resource migration
//!
//! Setup errors (bad mappings, ownership cycles, unknown kinds, discovery
//! failures) abort a pass before anything is written to the target group.
//! Everything else is scoped to a single kind or item and only logged.

use thiserror::Error;

/// Errors from migration operations
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed configuration (mapping syntax, group/version strings)
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
    },

    /// The owner mapping graph contains a cycle
    #[error("owner mapping contains a cycle through {node:?}")]
    Cycle {
        /// Node at which the cycle was detected
        node: String,
    },

    /// A kind named in the owner mapping is not served by the source group
    #[error("unable to find resource {name:?} from owner mapping")]
    UnknownKind {
        /// Plural resource name
        name: String,
    },

    /// The target definition still enables the status subresource
    #[error("definition {definition} has spec.subresources.status")]
    StatusSubresource {
        /// CustomResourceDefinition name (e.g. "foos.new.example.com")
        definition: String,
    },

    /// Resource discovery for a group/version failed
    #[error("discovery failed for {group_version}: {message}")]
    Discovery {
        /// Group/version being discovered
        group_version: String,
        /// Underlying cause
        message: String,
    },

    /// Resource store call failed for a reason other than not-found
    #[error("{operation} failed: {message}")]
    Store {
        /// Operation that failed (list, get, create)
        operation: &'static str,
        /// Underlying cause
        message: String,
    },

    /// Kubernetes API error
    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a store error for the given operation
    pub fn store(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Store {
            operation,
            message: message.into(),
        }
    }

    /// Whether this error aborts the whole pass rather than a single kind or item
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config { .. }
                | Error::Cycle { .. }
                | Error::UnknownKind { .. }
                | Error::Discovery { .. }
        )
    }
}

/// Check if a kube error is a 404 from the API server.
pub(crate) fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(api_err) if api_err.code == 404)
}
