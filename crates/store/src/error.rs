//! Error types for the storage layer, using snafu.

use nodewatch_types::NodeType;
use snafu::{Location, Snafu};

/// Result type for store operations.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Errors returned by [`NodeStore`](crate::NodeStore) and the backends.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// A node with the same `(type, name)` key already exists.
    #[snafu(display("node {name:?} of type {node_type} already exists"))]
    AlreadyExists {
        /// Type half of the unique key.
        node_type: NodeType,
        /// Name half of the unique key.
        name: String,
    },

    /// No node with the given id.
    #[snafu(display("node {id:?} not found"))]
    NotFound {
        /// The missing id.
        id: String,
    },

    /// The storage engine rejected or failed an operation.
    #[snafu(display("Backend error at {location}: {message}"))]
    Backend {
        /// Error description from the engine.
        message: String,
        /// Source code location for debugging.
        #[snafu(implicit)]
        location: Location,
    },

    /// A persisted record or log entry could not be decoded.
    #[snafu(display("Corrupt entry at {key}: {message}"))]
    Corrupt {
        /// Key of the undecodable entry.
        key: String,
        /// What failed to parse.
        message: String,
    },
}

impl StoreError {
    /// Whether this error is the create-collision case.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    /// Whether this error is the missing-node case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
