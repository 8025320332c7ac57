use thiserror::Error;

/// Failures raised by an object store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("object {0} is not valid UTF-8 text")]
    InvalidText(String),

    #[error("lease on {0} is no longer held by this caller")]
    LeaseLost(String),

    #[error("corrupt lease record for {key}: {reason}")]
    CorruptLease { key: String, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl std::fmt::Display, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            source,
        }
    }
}

/// Failures converting a document to or from its stored text form.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by the deployment repository to its callers.
#[derive(Debug, Error)]
pub enum DepotError {
    #[error("the deployment config is locked by another writer")]
    ConfigLocked,

    #[error("binaries not found: {0}")]
    BinariesNotFound(String),

    #[error("duplicate binaries: {0}")]
    DuplicateBinaries(String),

    #[error("failed to serialize {document}: {source}")]
    Serialization {
        document: String,
        #[source]
        source: SerializeError,
    },

    #[error("local filesystem error on {path}: {source}")]
    Local {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DepotError {
    pub(crate) fn serialization(document: &str, source: SerializeError) -> Self {
        Self::Serialization {
            document: document.to_string(),
            source,
        }
    }

    pub(crate) fn local(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Local {
            path: path.display().to_string(),
            source,
        }
    }
}
