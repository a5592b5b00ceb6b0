//! The error returned by handlers and its conversion into a response

use std::error::Error;
use std::fmt;
use std::panic::Location;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use thiserror::Error;
use tracing::debug;
use tracing::error;

use crate::schema::ApiErrorResponse;
use crate::stuff::api_json::ApiJson;

/// A type alias that includes the ApiError
pub type ApiResult<T> = Result<T, ApiError>;

/// The common error that is returned from the handlers
#[derive(Debug, Error)]
pub struct ApiError {
    /// Http status code to use for the response
    pub status_code: ApiErrorStatusCode,

    /// An arbitrary string literal describing the error
    ///
    /// It is exposed to the client as `message` unless the error is a server error.
    pub context: Option<&'static str>,

    /// Location where the error originated from
    pub location: &'static Location<'static>,

    /// The error's underlying source
    pub source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

/// Http status codes available for [`ApiError`]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ApiErrorStatusCode {
    /// The request was malformed, the client should correct it
    BadRequest,
    /// The request lacked credentials
    Unauthorized,
    /// The credentials are valid but lack the required role
    Forbidden,
    /// The requested key is absent
    NotFound,
    /// Something went wrong on our side
    ServerError,
}

impl ApiErrorStatusCode {
    /// Converts the status code into `http`'s type
    pub fn to_http(&self) -> StatusCode {
        match self {
            ApiErrorStatusCode::BadRequest => StatusCode::BAD_REQUEST,
            ApiErrorStatusCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiErrorStatusCode::Forbidden => StatusCode::FORBIDDEN,
            ApiErrorStatusCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorStatusCode::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message used when an error carries no context
    fn default_message(&self) -> &'static str {
        match self {
            ApiErrorStatusCode::BadRequest => "Bad request",
            ApiErrorStatusCode::Unauthorized => "Unauthenticated",
            ApiErrorStatusCode::Forbidden => "Missing privileges",
            ApiErrorStatusCode::NotFound => "Not found",
            ApiErrorStatusCode::ServerError => "Internal server error",
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status_code.default_message())?;
        if let Some(context) = self.context {
            write!(f, " '{context}'")?;
        }
        if let Some(source) = &self.source {
            write!(f, " cause by '{source}'")?;
        }
        write!(f, " at '{}'", self.location)
    }
}

impl ApiError {
    /// Constructs a new `ApiError` with [`ApiErrorStatusCode::BadRequest`]
    #[track_caller]
    pub fn bad_request(context: &'static str) -> Self {
        Self::new(ApiErrorStatusCode::BadRequest, Some(context))
    }

    /// Constructs a new `ApiError` with [`ApiErrorStatusCode::Unauthorized`]
    #[track_caller]
    pub fn unauthorized(context: &'static str) -> Self {
        Self::new(ApiErrorStatusCode::Unauthorized, Some(context))
    }

    /// Constructs a new `ApiError` with [`ApiErrorStatusCode::Forbidden`]
    #[track_caller]
    pub fn forbidden(context: &'static str) -> Self {
        Self::new(ApiErrorStatusCode::Forbidden, Some(context))
    }

    /// Constructs a new `ApiError` with [`ApiErrorStatusCode::NotFound`]
    #[track_caller]
    pub fn not_found(context: &'static str) -> Self {
        Self::new(ApiErrorStatusCode::NotFound, Some(context))
    }

    /// Constructs a new `ApiError` with [`ApiErrorStatusCode::ServerError`]
    #[track_caller]
    pub fn server_error(context: &'static str) -> Self {
        Self::new(ApiErrorStatusCode::ServerError, Some(context))
    }

    /// Adds a source to the `ApiError`
    pub fn with_source(self, source: impl Error + Send + Sync + 'static) -> Self {
        self.with_boxed_source(source.into())
    }

    /// Adds a source to the `ApiError`
    pub fn with_boxed_source(mut self, source: Box<dyn Error + Send + Sync + 'static>) -> Self {
        self.source = Some(source);
        self
    }

    /// Adds a location to the `ApiError`
    ///
    /// Normally the location which is added automatically is enough.
    pub fn with_manual_location(mut self, location: &'static Location<'static>) -> Self {
        self.location = location;
        self
    }

    /// Creates a closure for wrapping any error into an `ApiError::server_error`
    ///
    /// This is just a less noisy shorthand for `|error| ApiError::server_error("...").with_source(error)`.
    #[track_caller]
    pub fn map_server_error<E: Error + Send + Sync + 'static>(
        context: &'static str,
    ) -> impl Fn(E) -> Self {
        let location = Location::caller();
        move |error| {
            Self::server_error(context)
                .with_source(error)
                .with_manual_location(location)
        }
    }

    /// The message exposed to the client
    ///
    /// Server errors never leak their context.
    pub fn message(&self) -> &'static str {
        match (self.status_code, self.context) {
            (ApiErrorStatusCode::ServerError, _) | (_, None) => {
                self.status_code.default_message()
            }
            (_, Some(context)) => context,
        }
    }

    /// Emit a tracing event `error!` or `debug!` describing the `ApiError`
    pub fn emit_tracing_event(&self) {
        let Self {
            status_code,
            context,
            location,
            source,
        } = &self;

        match status_code {
            ApiErrorStatusCode::BadRequest
            | ApiErrorStatusCode::Unauthorized
            | ApiErrorStatusCode::Forbidden
            | ApiErrorStatusCode::NotFound => {
                debug!(
                    error.status_code = status_code.to_http().as_u16(),
                    error.status_message = status_code.to_http().as_str(),
                    error.context = context,
                    error.file = location.file(),
                    error.line = location.line(),
                    error.column = location.column(),
                    error.display = source.as_ref().map(tracing::field::display),
                    error.debug = source.as_ref().map(tracing::field::debug),
                    "Client error"
                );
            }
            ApiErrorStatusCode::ServerError => {
                error!(
                    error.status_code = status_code.to_http().as_u16(),
                    error.status_message = status_code.to_http().as_str(),
                    error.context = context,
                    error.file = location.file(),
                    error.line = location.line(),
                    error.column = location.column(),
                    error.display = source.as_ref().map(tracing::field::display),
                    error.debug = source.as_ref().map(tracing::field::debug),
                    "Server error"
                );
            }
        }
    }

    /// Constructs a new `ApiError`
    #[track_caller]
    fn new(status_code: ApiErrorStatusCode, context: Option<&'static str>) -> Self {
        Self {
            status_code,
            context,
            location: Location::caller(),
            source: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.emit_tracing_event();

        let response = ApiErrorResponse {
            message: self.message().to_string(),
        };

        (self.status_code.to_http(), ApiJson(response)).into_response()
    }
}

/// Simple macro to reduce the noise of several identical `From` implementations
///
/// It takes a list of error types which are converted into a server error.
macro_rules! impl_into_internal_server_error {
    ($($error:ty,)*) => {$(
        impl From<$error> for ApiError {
            #[track_caller]
            fn from(value: $error) -> Self {
                Self {
                    status_code: ApiErrorStatusCode::ServerError,
                    context: None,
                    location: Location::caller(),
                    source: Some(value.into()),
                }
            }
        }
    )*};
}
impl_into_internal_server_error!(std::io::Error, anyhow::Error,);
#[cfg(feature = "rorm")]
impl_into_internal_server_error!(rorm::Error,);
