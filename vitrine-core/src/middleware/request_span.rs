//! Middleware running every request inside its own tracing span

use std::convert::Infallible;
use std::time::Instant;

use axum::extract::Request;
use axum::response::IntoResponse;
use axum::response::Response;
use tracing::Instrument;
use tracing::debug;
use tracing::info_span;

use crate::middleware::AxumService;
use crate::middleware::VitrineMiddleware;

/// Opens a `request` span with the method and path
/// and logs the response's status once the handler is done.
#[derive(Copy, Clone, Debug, Default)]
pub struct RequestSpanMiddleware;

impl VitrineMiddleware for RequestSpanMiddleware {
    async fn call<S: AxumService>(
        self,
        mut inner: S,
        request: Request,
    ) -> Result<Response, Infallible> {
        let span = info_span!(
            "request",
            http.method = %request.method(),
            http.path = request.uri().path(),
        );
        let started = Instant::now();

        async move {
            let response = inner.call(request).await.into_response();
            debug!(
                http.status = response.status().as_u16(),
                http.elapsed_ms = started.elapsed().as_millis() as u64,
                "Finished request"
            );
            Ok(response)
        }
        .instrument(span)
        .await
    }
}
