use reqwest::StatusCode;
use thiserror::Error;

/// Error returned by the [`ApiClient`](crate::ApiClient) and the [`ResourceCache`](crate::ResourceCache)
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server rejected the request's content (`400`).
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The request lacked credentials or the required role (`401` or `403`).
    #[error("Not authorized: {message}")]
    NotAuthorized {
        /// Either `401` or `403`
        status: StatusCode,
        /// The server's message
        message: String,
    },

    /// The requested key does not exist (`404`).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The server failed (`5xx` or an unexpected status).
    ///
    /// Reads may be retried.
    #[error("Server error ({status}): {message}")]
    Transient {
        /// The response's status
        status: StatusCode,
        /// The server's message
        message: String,
    },

    /// The request could not be sent or its response could not be read.
    #[error("Http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The base url can't have path segments appended.
    #[error("Invalid base url: {0}")]
    InvalidUrl(String),

    /// The cache the subscription belongs to has been dropped.
    #[error("The resource cache has been dropped")]
    CacheClosed,
}

impl ClientError {
    /// Constructs the error matching a non-success status
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::BAD_REQUEST => ClientError::Validation(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ClientError::NotAuthorized { status, message }
            }
            StatusCode::NOT_FOUND => ClientError::NotFound(message),
            status => ClientError::Transient { status, message },
        }
    }

    /// Might retrying the same request succeed?
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transient { .. } | ClientError::Http(_))
    }
}
