//! Snapshot of the request taken before it is handed to the inner service.

use axum::extract::{MatchedPath, Request};
use axum::http::{HeaderMap, Method, Uri};

/// Request information retained by middleware after the request body has
/// been moved into the rest of the chain.
#[derive(Debug, Clone)]
pub struct RequestSummary {
    /// HTTP method of the request.
    pub method: Method,
    /// Request URI as received.
    pub uri: Uri,
    /// Route template matched by the router, if any.
    pub route: Option<String>,
    /// Request headers.
    pub headers: HeaderMap,
}

impl RequestSummary {
    /// Captures a summary of the given request.
    pub fn from_request(request: &Request) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            route: request
                .extensions()
                .get::<MatchedPath>()
                .map(|path| path.as_str().to_owned()),
            headers: request.headers().clone(),
        }
    }

    /// Returns the path and query of the request, as originally sent.
    pub fn url(&self) -> &str {
        self.uri
            .path_and_query()
            .map_or_else(|| self.uri.path(), |pq| pq.as_str())
    }
}
