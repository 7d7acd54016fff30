//! Error types shared by the store, the reconcile engine and the operands.

use thiserror::Error;

use crate::bundle::BundleError;

/// Errors produced while reconciling operand resources
#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("Conflict writing {kind} {name}: {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("Template bundle error: {0}")]
    Bundle(#[from] BundleError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Absence is the only error the reconcile and cleanup paths tolerate.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube(kube::Error::Api(response)) => response.code == 404,
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
