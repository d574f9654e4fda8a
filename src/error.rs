use std::time::Duration;

use thiserror::Error;

/// Error types for `cigraph` operations.
///
/// Covers configuration errors, GitLab API failures, pipeline-file parsing
/// problems and graph-storage failures.
#[derive(Error, Debug)]
pub enum CigraphError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("client is unauthorised")]
    Unauthorized,

    #[error("client is forbidden")]
    Forbidden,

    #[error("auth check against GitLab did not succeed within its deadline")]
    AuthCheckExhausted,

    #[error("project stream failed")]
    StreamFailed,

    #[error("GitLab API returned status {status} for {url}")]
    Api { status: u16, url: String },

    #[error("raw file was not found")]
    RawFileNotFound,

    #[error("failed to get raw file {file} on ref {ref_name} in project {project_id}: status {status}")]
    RawFile {
        project_id: u64,
        file: String,
        ref_name: String,
        status: u16,
    },

    #[error("'{header}' is not a valid RFC 8288 link header")]
    InvalidLinkHeader { header: String },

    #[error("failed to parse pipeline file: {0}")]
    Parse(String),

    #[error("cycle detected, the files visited are: {chain}")]
    CycleDetected { chain: String },

    #[error("operation was canceled")]
    Canceled,

    #[error("storage error: {0}")]
    Storage(#[from] neo4rs::Error),

    #[error("storage operation timed out after {0:?}")]
    StorageTimeout(Duration),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("network error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Result type alias using `CigraphError` as the error type.
pub type Result<T> = std::result::Result<T, CigraphError>;
