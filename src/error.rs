//! Error taxonomy shared by the config, store, and gateway services.
//!
//! Every error carries a [`Severity`]. Startup code treats [`Severity::Fatal`]
//! as a reason to stop the orchestrated sequence; request handlers turn any
//! error into a structured failure response and keep the process alive.

use std::path::PathBuf;

/// How the orchestrator should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Halts startup.
    Fatal,
    /// Reported to the caller (or handled locally); the process continues.
    Recoverable,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("model backend is not running at {base_url}. Please start it first ({reason})")]
    BackendUnavailable { base_url: String, reason: String },

    #[error("model {0} is not available")]
    ModelNotFound(String),

    #[error("failed to connect to document store {target}: {source}")]
    StoreConnection {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("document store not connected")]
    StoreNotConnected,

    #[error("store operation on collection {collection} failed: {source}")]
    Store {
        collection: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("{}", backend_request_message(.status, .message))]
    BackendRequest {
        status: Option<u16>,
        message: String,
    },
}

fn backend_request_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("backend request failed with status {}: {}", code, message),
        None => format!("backend request failed: {}", message),
    }
}

impl Error {
    pub fn severity(&self) -> Severity {
        match self {
            Error::BackendUnavailable { .. } | Error::StoreConnection { .. } => Severity::Fatal,
            // Config I/O is recoverable on load; callers escalate save failures themselves.
            _ => Severity::Recoverable,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// True when the error means the config file simply does not exist yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn store(collection: &str, source: sqlx::Error) -> Self {
        Error::Store {
            collection: collection.to_string(),
            source,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::BackendRequest {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
