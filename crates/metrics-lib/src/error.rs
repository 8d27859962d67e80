//! Error types for metric sources

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A source attempt that broke rather than finding no data
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read service account token {}: {source}", path.display())]
    Credential {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid cluster CA bundle {}: {reason}", path.display())]
    TrustAnchor { path: PathBuf, reason: String },

    #[error("invalid API server URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("node {node} has no {field} usage")]
    MissingField { node: String, field: &'static str },
}

/// Failure to run an external command to completion
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("failed to collect output of {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}
