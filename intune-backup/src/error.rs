//! Error types for intune-backup
//!
//! Severity follows the backup taxonomy:
//! - `GraphError` on a primary fetch is fatal for the module (`BackupError::PrimaryFetch`)
//! - `GraphError` on a dependent lookup only degrades the affected field
//! - `PersistError` is fatal for the module (`BackupError::Persist`)

use thiserror::Error;

/// Transport error from the Graph API collaborator
#[derive(Debug, Error)]
pub enum GraphError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Failed to parse response
    #[error("Parse error: {0}")]
    Parse(String),

    /// Client could not be configured
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for GraphError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GraphError::Parse(err.to_string())
        } else {
            GraphError::Network(err.to_string())
        }
    }
}

/// Persistence collaborator error
#[derive(Debug, Error)]
pub enum PersistError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be serialized to the output format
    #[error("Serialize error: {0}")]
    Serialize(String),

    /// Record carries neither its name key nor an id
    #[error("Record has no '{0}' and no 'id' to name its file")]
    MissingName(String),
}

/// Module-level backup failure
#[derive(Debug, Error)]
pub enum BackupError {
    /// Primary list request failed
    #[error("Error getting {module} data from {endpoint}: {source}")]
    PrimaryFetch {
        module: String,
        endpoint: String,
        #[source]
        source: GraphError,
    },

    /// Primary list response did not carry a `value` array
    #[error("Unexpected {module} response from {endpoint}: {detail}")]
    UnexpectedResponse {
        module: String,
        endpoint: String,
        detail: String,
    },

    /// Final write failed
    #[error("Error processing {module} data: {source}")]
    Persist {
        module: String,
        #[source]
        source: PersistError,
    },
}

/// Result type for module runs
pub type BackupResult<T> = Result<T, BackupError>;
