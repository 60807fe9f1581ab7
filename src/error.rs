// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// The extraction call produced nothing usable. Always a whole-call failure:
/// no partial order list is ever returned next to one of these.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request to inference service failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("inference service returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("no data returned from inference service")]
    EmptyResponse,

    #[error("malformed response from inference service: {0}")]
    MalformedResponse(String),

    #[error("inference backend unavailable: {0}")]
    Unavailable(String),

    #[error("gateway configuration error: {0}")]
    Configuration(String),
}

/// One image of a session could not be turned into records. The session
/// and its store stay usable.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("error reading file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Extract(#[from] GatewayError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}
