//! Error types for node store operations.

use std::fmt;

/// Result type for node store operations.
pub type NodeStoreResult<T> = Result<T, NodeStoreError>;

/// Errors that can occur during node store operations.
#[derive(Debug)]
pub enum NodeStoreError {
    /// Remote call failed to complete (connection failure, 5xx, bad
    /// response).
    Transport { source: anyhow::Error },

    /// Remote entity (index, template, alias, document) is absent.
    NotFound { resource: String },

    /// Concurrent modification detected by the remote store.
    Conflict { resource: String },

    /// Stored payload could not be decoded or decompressed.
    CorruptData { reason: String },

    /// Partition name does not carry a `YYYY-MM-DD` date after the template
    /// prefix.
    UnparsableName { name: String, reason: String },

    /// More than one partition holds the same document id.
    MultipleMatches { id: String, partitions: Vec<String> },

    /// Configuration rejected by validation.
    InvalidConfig { reason: String },

    /// Generic error.
    Other { source: anyhow::Error },
}

impl NodeStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, NodeStoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, NodeStoreError::Conflict { .. })
    }
}

impl fmt::Display for NodeStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStoreError::Transport { source } => write!(f, "Transport error: {}", source),
            NodeStoreError::NotFound { resource } => write!(f, "Not found: {}", resource),
            NodeStoreError::Conflict { resource } => {
                write!(f, "Conflicting modification: {}", resource)
            }
            NodeStoreError::CorruptData { reason } => write!(f, "Corrupt stored data: {}", reason),
            NodeStoreError::UnparsableName { name, reason } => {
                write!(f, "Unparsable partition name '{}': {}", name, reason)
            }
            NodeStoreError::MultipleMatches { id, partitions } => write!(
                f,
                "Document '{}' found in multiple partitions: {}",
                id,
                partitions.join(", ")
            ),
            NodeStoreError::InvalidConfig { reason } => {
                write!(f, "Invalid configuration: {}", reason)
            }
            NodeStoreError::Other { source } => write!(f, "Node store error: {}", source),
        }
    }
}

impl std::error::Error for NodeStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NodeStoreError::Transport { source } => Some(source.as_ref()),
            NodeStoreError::Other { source } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for NodeStoreError {
    fn from(err: anyhow::Error) -> Self {
        NodeStoreError::Other { source: err }
    }
}

impl From<reqwest::Error> for NodeStoreError {
    fn from(err: reqwest::Error) -> Self {
        NodeStoreError::Transport {
            source: anyhow::Error::from(err),
        }
    }
}

impl From<serde_json::Error> for NodeStoreError {
    fn from(err: serde_json::Error) -> Self {
        NodeStoreError::Other {
            source: anyhow::Error::from(err),
        }
    }
}

impl From<url::ParseError> for NodeStoreError {
    fn from(err: url::ParseError) -> Self {
        NodeStoreError::InvalidConfig {
            reason: format!("invalid url: {}", err),
        }
    }
}
