use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by save-and-restore client operations.
///
/// Every failed call maps to exactly one variant. A successful call never
/// carries an error and a failed call never carries a partial payload.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Base URL is not a valid absolute URL.
    #[error("invalid base URL '{0}'")]
    InvalidBaseUrl(String),

    /// Endpoint path could not be joined to the base URL.
    #[error("invalid endpoint path '{0}'")]
    InvalidPath(String),

    /// A caller-supplied argument is invalid. Raised before any I/O happens.
    #[error("invalid request parameter: {0}")]
    Parameter(String),

    /// The request did not complete within the configured timeout.
    ///
    /// Timeouts are always reported through this variant, never as
    /// [`ClientError::Transport`] and never as a status-code error.
    #[error("request timed out: {method} {path}")]
    Timeout {
        method: String,
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// Network-level failure other than a timeout, such as a failed DNS
    /// lookup, a refused connection or a broken TLS handshake.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// HTTP response with a status code in `400..500`.
    #[error("client error {status} for {url}: {detail}")]
    Client {
        status: StatusCode,
        url: String,
        detail: String,
    },

    /// HTTP response with a status code of 500 or above.
    #[error("server error {status} for {url}: {detail}")]
    Server {
        status: StatusCode,
        url: String,
        detail: String,
    },

    /// The exchange succeeded at the HTTP level but the body carried an
    /// explicit `"success": false` marker.
    #[error("request failed: {message}")]
    RequestFailed { message: String },
}

impl ClientError {
    /// HTTP status code for [`ClientError::Client`] and
    /// [`ClientError::Server`], `None` for every other variant.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Client { status, .. } | Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}
