//! Middleware which catches stack unwinding caused by a panic
//! and converts it into a `500` response and a logged error.

use std::any::Any;
use std::convert::Infallible;
use std::future::poll_fn;
use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::pin::pin;
use std::task::Poll;

use axum::extract::Request;
use axum::response::IntoResponse;
use axum::response::Response;
use tracing::error;

use crate::middleware::AxumService;
use crate::middleware::VitrineMiddleware;
use crate::stuff::api_error::ApiError;

/// Middleware which catches stack unwinding caused by a panic
/// and converts it into a `500` response and a logged error.
#[derive(Copy, Clone, Debug, Default)]
pub struct CatchUnwindMiddleware;

impl VitrineMiddleware for CatchUnwindMiddleware {
    async fn call<S: AxumService>(
        self,
        mut inner: S,
        request: Request,
    ) -> Result<Response, Infallible> {
        let mut inner = pin!(inner.call(request));
        Ok(poll_fn(
            |cx| match catch_unwind(AssertUnwindSafe(|| inner.as_mut().poll(cx))) {
                Ok(Poll::Pending) => Poll::Pending,
                Ok(Poll::Ready(res)) => Poll::Ready(res.into_response()),
                Err(payload) => Poll::Ready(handle_panic(payload)),
            },
        )
        .await)
    }
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str));
    error!(panic.message = message, "Handler panicked");
    ApiError::server_error("Caught panic in handler").into_response()
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;
    use tower::ServiceExt;

    use super::*;

    async fn explode() -> &'static str {
        panic!("boom")
    }

    #[tokio::test]
    async fn panicking_handler_becomes_server_error() {
        let router = Router::new()
            .route("/explode", get(explode))
            .route("/fine", get(|| async { "fine" }))
            .layer(CatchUnwindMiddleware.into_layer());

        let response = router
            .clone()
            .oneshot(axum::http::Request::get("/explode").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = router
            .oneshot(axum::http::Request::get("/fine").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
