use std::fmt::Debug;

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Any error originating from the `kube-rs` crate
    #[error("Kubernetes reported error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },
    #[error("{0}")]
    UserInput(String),
    #[error("Unnamed k8s object")]
    UnnamedObject,
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("User assigned identity not found")]
    UserAssignedIdentityMissing,
    #[error("Invalid quantity {0:?}")]
    InvalidQuantity(String),
    #[error("Failed to render cloud provider config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("RwLock poisoned: {0}")]
    RwLockPoisoned(String),

    /// Can be used by callers of the crate's traits to return their own errors
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    pub fn not_found(kind: impl Into<String>, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// True for a local cache miss as well as a 404 from the API server.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube {
                source: kube::Error::Api(response),
            } => response.code == 404,
            _ => false,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Error::Kube {
                source: kube::Error::Api(response),
            } if response.code == 409 && response.reason == "AlreadyExists"
        )
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::RwLockPoisoned(e.to_string())
    }
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> Error {
    Error::from(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{reason} for test"),
        reason: reason.to_string(),
        code,
    }))
}
