//! Json body wrapper reporting rejections as [`ApiError`]

use axum::Json;
use axum::extract::FromRequest;
use axum::extract::Request;
use axum::extract::rejection::JsonRejection;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::stuff::api_error::ApiError;

/// Drop-in replacement for [`Json`] whose rejection is an [`ApiError`]
///
/// This keeps the error body uniform: a malformed json body produces
/// the same `{ message }` object as any other client error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(request, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(match rejection {
                JsonRejection::MissingJsonContentType(_) => {
                    ApiError::bad_request("Expected a json content type")
                }
                JsonRejection::JsonSyntaxError(_) => ApiError::bad_request("Invalid json"),
                JsonRejection::JsonDataError(_) => ApiError::bad_request("Unexpected json shape"),
                _ => ApiError::bad_request("Failed to read the request body"),
            }
            .with_source(rejection)),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiJson<T> {
    fn into_response(self) -> Response {
        Json(self.0).into_response()
    }
}
