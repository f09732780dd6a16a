//! Error types for srcstore operations

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unrecognized store --type value: {0:?} (valid values are RepoStore, MultiRepoStore)")]
    UnknownStoreType(String),

    #[error("--config {config:?}: {message}")]
    InvalidStoreConfig { config: String, message: String },

    #[error("{0}")]
    PartialFilter(String),

    #[error("filter {filter} does not apply to {entity}")]
    FilterNotApplicable {
        filter: &'static str,
        entity: &'static str,
    },

    #[error("store (type {store_type}) does not implement {operation}")]
    NotImplemented {
        operation: &'static str,
        store_type: &'static str,
    },

    #[error("store (type {store_type}) does not implement importing")]
    ImportNotImplemented { store_type: &'static str },

    #[error("unexpected --output value: {0:?}")]
    UnknownOutputFormat(String),

    #[error("{0}")]
    Usage(String),

    #[error("index listing or index building errors occurred ({count} failed, see above)")]
    IndexErrors { count: usize },

    #[error("invalid graph data: {0}")]
    InvalidData(String),

    #[error("build plan error: {0}")]
    Plan(String),

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("object storage request for {url} failed with status {status}")]
    ObjectStorage { url: String, status: u16 },
}

impl StoreError {
    /// True for errors raised before any store I/O happens (bad flags or config).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownStoreType(_)
                | Self::InvalidStoreConfig { .. }
                | Self::PartialFilter(_)
                | Self::FilterNotApplicable { .. }
                | Self::UnknownOutputFormat(_)
                | Self::Usage(_)
                | Self::ConfigParse(_)
        )
    }

    /// True when the selected backend lacks the requested operation.
    pub fn is_capability(&self) -> bool {
        matches!(
            self,
            Self::NotImplemented { .. } | Self::ImportNotImplemented { .. }
        )
    }
}
