//! Error types for convoy

use thiserror::Error;

/// Result type for convoy operations
pub type Result<T> = std::result::Result<T, ConvoyError>;

/// convoy error types
#[derive(Error, Debug)]
pub enum ConvoyError {
    /// Raw error output of the provisioning CLI, kept verbatim.
    #[error("{0}")]
    Provision(String),

    #[error("Failed to create cluster {cluster}: {message}")]
    ClusterCreate { cluster: String, message: String },

    #[error("cannot find host {0}")]
    HostNotFound(String),

    #[error(
        "unable to acquire file lock {lock} after timeout of {timeout:?}, \
         wait till other process finish working on {resource} \
         or resolve this by manually removing {lock}"
    )]
    LockTimeout {
        lock: String,
        resource: String,
        timeout: std::time::Duration,
    },

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Command timed out after {timeout:?}: {command}")]
    CommandTimeout {
        command: String,
        timeout: std::time::Duration,
    },

    #[error("Interrupted: {0}")]
    Interrupted(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(String),
}
