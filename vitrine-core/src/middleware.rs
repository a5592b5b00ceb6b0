//! Request wrappers shared by vitrine's routers
//!
//! Writing a [`tower::Layer`] by hand takes a layer, a service and a future type.
//! Vitrine's middlewares only need an async function around the handler,
//! so they implement [`VitrineMiddleware`] (or [`SimpleVitrineMiddleware`])
//! and are mounted with [`VitrineMiddleware::into_layer`].
//!
//! Vitrine itself uses three: bearer token auth, [`catch_unwind`] and [`request_span`].

use std::convert::Infallible;
use std::ops::ControlFlow;
use std::task::Context;
use std::task::Poll;

use axum::extract::Request;
use axum::response::IntoResponse;
use axum::response::Response;
use futures_lite::future::Boxed;
use tower::Layer;
use tower::Service;

pub mod catch_unwind;
pub mod request_span;

/// Inspects a request before the handler sees it
///
/// Returning [`ControlFlow::Break`] answers the request without calling the handler,
/// e.g. with a 401 for an unknown token.
pub trait SimpleVitrineMiddleware: Clone + Send + Sync + 'static {
    /// Passes the (possibly extended) request on or answers it directly
    fn pre_handler(
        &mut self,
        request: Request,
    ) -> impl Future<Output = ControlFlow<Response, Request>> + Send;
}

/// Runs around the wrapped handler
///
/// The middleware is cloned for every request and receives a ready clone of the inner service.
/// It decides whether and when to call it and may rewrite the response.
pub trait VitrineMiddleware: Clone + Send + Sync + 'static {
    /// Handles one request, usually by calling `inner`
    fn call<S: AxumService>(
        self,
        inner: S,
        request: Request,
    ) -> impl Future<Output = Result<Response, Infallible>> + Send + 'static;

    /// Turns the middleware into a layer for [`axum::Router::layer`]
    fn into_layer(self) -> MiddlewareLayer<Self>
    where
        Self: Sized,
    {
        MiddlewareLayer(self)
    }
}

impl<T: SimpleVitrineMiddleware> VitrineMiddleware for T {
    async fn call<S: AxumService>(
        mut self,
        mut inner: S,
        request: Request,
    ) -> Result<Response, Infallible> {
        Ok(match self.pre_handler(request).await {
            ControlFlow::Continue(request) => inner.call(request).await.into_response(),
            ControlFlow::Break(response) => response,
        })
    }
}

/// The [`tower::Layer`] returned by [`VitrineMiddleware::into_layer`]
#[derive(Copy, Clone, Debug)]
pub struct MiddlewareLayer<M>(pub M);

impl<M, S> Layer<S> for MiddlewareLayer<M>
where
    M: VitrineMiddleware,
{
    type Service = MiddlewareService<M, S>;
    fn layer(&self, inner: S) -> Self::Service {
        MiddlewareService {
            inner,
            middleware: self.0.clone(),
        }
    }
}

/// A service wrapped by a [`VitrineMiddleware`]
#[derive(Copy, Clone, Debug)]
pub struct MiddlewareService<M, S> {
    inner: S,
    middleware: M,
}

impl<M, S> Service<Request> for MiddlewareService<M, S>
where
    M: VitrineMiddleware,
    S: AxumService,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Boxed<Result<Response, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // `poll_ready` was called on `self.inner`, hand that one to the request
        let fresh = self.inner.clone();
        let polled = std::mem::replace(&mut self.inner, fresh);
        Box::pin(self.middleware.clone().call(polled, request))
    }
}

/// The services a router can be layered with: infallible, cloneable and `Send`
pub trait AxumService:
    Service<Request, Error = Infallible, Response: IntoResponse, Future: Send + 'static>
    + Clone
    + Send
    + 'static
{
}
impl<T> AxumService for T where
    T: Service<Request, Error = Infallible, Response: IntoResponse, Future: Send + 'static>
        + Clone
        + Send
        + 'static
{
}
