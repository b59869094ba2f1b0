//! Error types for the store client and the exporters.
//!
//! Per-item failures are values, not panics: the pipeline receives them and decides in a
//! visible branch whether to log and continue.

use std::path::PathBuf;

use thiserror::Error;

/// Failures while building an HTTP client from settings. Always fatal at startup.
#[derive(Debug, Error)]
pub enum HttpSetupError {
    #[error("missing required setting: {0}")]
    MissingSetting(&'static str),

    #[error("invalid value for header {name}")]
    InvalidHeader { name: &'static str },

    #[error("failed to read CA bundle {}: {source}", path.display())]
    CaBundleRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CA bundle {} is not valid PEM: {source}", path.display())]
    CaBundleParse {
        path: PathBuf,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

/// Failures talking to the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("{url} returned a body without a recognisable document list")]
    UnrecognisedBody { url: String },

    /// Every upload route and field name was tried without getting a document id back.
    /// `accepted_without_ids` counts attempts that got a 2xx anyway: the store may hold
    /// a document nobody attached.
    #[error(
        "no upload route returned a document id for {} ({accepted_without_ids} attempts accepted without id)",
        file.display()
    )]
    UploadExhausted {
        file: PathBuf,
        accepted_without_ids: usize,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Setup(#[from] HttpSetupError),
}

/// Failures reading a source system or writing its export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("{url} returned an unexpected payload: {reason}")]
    Schema { url: String, reason: String },

    #[error("invalid base URL {url}")]
    InvalidBaseUrl { url: String },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Setup(#[from] HttpSetupError),
}
