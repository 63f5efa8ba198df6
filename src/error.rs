//! Error types for descriptor resolution, synthesis and rendering

use thiserror::Error;

use crate::descriptor::DescriptorKind;

/// Result type for descriptor operations
pub type Result<T> = std::result::Result<T, ReflectError>;

/// Descriptor engine errors
///
/// "Not found" is never an error: lookups return `Ok(None)` for URLs that
/// resolve to nothing.
#[derive(Error, Debug)]
pub enum ReflectError {
    #[error("type {url} resolved to {found}, expected {expected}")]
    UnexpectedKind {
        url: String,
        expected: DescriptorKind,
        found: DescriptorKind,
    },

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("fetcher re-entered the registry while fetching {0}")]
    ReentrantFetch(String),

    #[error("malformed {element}: {reason}")]
    Malformed { element: String, reason: String },

    #[error("type not found: {0}")]
    TypeNotFound(String),

    #[error("invalid type URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("duplicate symbol: {0}")]
    DuplicateName(String),

    #[error("file {file} imports unknown file {dependency}")]
    MissingDependency { file: String, dependency: String },

    #[error("cannot resolve {name} from scope {scope}")]
    UnresolvedReference { name: String, scope: String },

    #[error("invalid value for field {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("wire decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl ReflectError {
    pub(crate) fn malformed(element: impl Into<String>, reason: impl Into<String>) -> Self {
        ReflectError::Malformed {
            element: element.into(),
            reason: reason.into(),
        }
    }
}
