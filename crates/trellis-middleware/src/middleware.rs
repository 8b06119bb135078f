//! The calling contract shared by every middleware in this crate.

use std::future::Future;

use axum::extract::{Request, State};
use axum::middleware::{FromFnLayer, Next};
use axum::response::{IntoResponse, Response};
use futures::future::{BoxFuture, FutureExt};

/// A request interceptor with the `(request, next) -> response` shape.
///
/// Implemented for every `Fn(Request, Next) -> impl Future` whose output
/// implements [`IntoResponse`], so plain `async fn`s qualify, and by the
/// stateful middleware types of this crate.
pub trait Middleware: Send + Sync + 'static {
    /// Handles `request`, usually by running `next` somewhere in between.
    fn call(&self, request: Request, next: Next) -> BoxFuture<'static, Response>;
}

impl<F, Fut, R> Middleware for F
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    fn call(&self, request: Request, next: Next) -> BoxFuture<'static, Response> {
        let response = self(request, next);
        async move { response.await.into_response() }.boxed()
    }
}

type Run<M> = fn(State<M>, Request, Next) -> BoxFuture<'static, Response>;

/// Layer produced by [`middleware_layer`].
pub type MiddlewareLayer<M> = FromFnLayer<Run<M>, M, (State<M>, Request)>;

/// Wraps a [`Middleware`] into a layer accepted by [`axum::Router::layer`].
pub fn middleware_layer<M>(middleware: M) -> MiddlewareLayer<M>
where
    M: Middleware + Clone,
{
    axum::middleware::from_fn_with_state(middleware, run::<M> as Run<M>)
}

fn run<M: Middleware>(
    State(middleware): State<M>,
    request: Request,
    next: Next,
) -> BoxFuture<'static, Response> {
    middleware.call(request, next)
}
