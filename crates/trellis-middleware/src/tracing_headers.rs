//! Request tracing identifiers.
//!
//! Incoming requests may carry a request ID and a handful of session IDs.
//! This module extracts them once per request, generating a request ID when
//! the client did not send one, and turns them back into headers for calls
//! to other services.

use std::convert::Infallible;

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use axum::middleware::Next;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use crate::app::AppIdentifier;
use crate::utility::tracing_targets::TRACING_HEADERS as TRACING_TARGET;
use crate::{Error, Result};

/// Header carrying the request ID.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Header carrying the event capture session ID.
pub const EC_SESSION_ID_HEADER: HeaderName = HeaderName::from_static("x-seek-ec-sessionid");

/// Header carrying the event capture visitor ID.
pub const EC_VISITOR_ID_HEADER: HeaderName = HeaderName::from_static("x-seek-ec-visitorid");

/// Header carrying an ad-hoc session ID.
pub const ADHOC_SESSION_ID_HEADER: HeaderName = HeaderName::from_static("x-session-id");

/// Tracing identifiers of a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTracing {
    /// Unique identifier of the client-initiated request.
    pub request_id: String,
    /// Event capture session ID.
    pub ec_session_id: Option<String>,
    /// Event capture visitor ID.
    pub ec_visitor_id: Option<String>,
    /// Session ID whose meaning is defined by the calling system.
    pub adhoc_session_id: Option<String>,
}

impl RequestTracing {
    /// Reads tracing identifiers from `headers`, generating a request ID if
    /// none is present. Empty and non-textual values count as absent.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .filter(|value| !value.is_empty())
                .map(str::to_owned)
        };

        Self {
            request_id: read(&REQUEST_ID_HEADER).unwrap_or_else(|| Uuid::new_v4().to_string()),
            ec_session_id: read(&EC_SESSION_ID_HEADER),
            ec_visitor_id: read(&EC_VISITOR_ID_HEADER),
            adhoc_session_id: read(&ADHOC_SESSION_ID_HEADER),
        }
    }

    fn session_headers(&self) -> [(HeaderName, Option<&str>); 3] {
        [
            (EC_SESSION_ID_HEADER, self.ec_session_id.as_deref()),
            (EC_VISITOR_ID_HEADER, self.ec_visitor_id.as_deref()),
            (ADHOC_SESSION_ID_HEADER, self.adhoc_session_id.as_deref()),
        ]
    }
}

/// Returns the tracing identifiers of `request`.
///
/// The result is cached in the request extensions, so every caller sees the
/// same generated request ID.
pub fn tracing_from_request(request: &mut Request) -> RequestTracing {
    if let Some(tracing) = request.extensions().get::<RequestTracing>() {
        return tracing.clone();
    }

    let tracing = RequestTracing::from_headers(request.headers());
    request.extensions_mut().insert(tracing.clone());
    tracing
}

/// Same as [`tracing_from_request`], for extractors.
pub fn tracing_from_parts(parts: &mut Parts) -> RequestTracing {
    if let Some(tracing) = parts.extensions.get::<RequestTracing>() {
        return tracing.clone();
    }

    let tracing = RequestTracing::from_headers(&parts.headers);
    parts.extensions.insert(tracing.clone());
    tracing
}

impl<S: Send + Sync> FromRequestParts<S> for RequestTracing {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(tracing_from_parts(parts))
    }
}

/// Builds the headers to send on a request to another service.
///
/// Sets `User-Agent` to the application identity, forwards the request ID and
/// any session IDs that are present.
///
/// # Errors
///
/// Returns an error if the application identity is not a valid header value.
pub fn outgoing_headers(app: &AppIdentifier, tracing: &RequestTracing) -> Result<HeaderMap> {
    let header_value = |name: &HeaderName, value: &str| {
        HeaderValue::from_str(value).map_err(|error| Error::invalid_header(name.to_string(), error))
    };

    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, header_value(&header::USER_AGENT, &app.user_agent())?);
    headers.insert(REQUEST_ID_HEADER, header_value(&REQUEST_ID_HEADER, &tracing.request_id)?);

    for (name, session_id) in tracing.session_headers() {
        if let Some(session_id) = session_id.filter(|id| !id.is_empty()) {
            let session_id = header_value(&name, session_id)?;
            headers.insert(name, session_id);
        }
    }

    Ok(headers)
}

/// Propagates tracing identifiers through the request.
///
/// Caches the identifiers for downstream extractors, runs the rest of the
/// chain inside a `request` span carrying the request ID and echoes
/// `x-request-id` on the response unless a handler already set it.
pub async fn tracing_middleware(mut request: Request, next: Next) -> Response {
    let tracing = tracing_from_request(&mut request);
    let span = tracing::info_span!(
        target: TRACING_TARGET,
        "request",
        request_id = %tracing.request_id,
        method = %request.method(),
        uri = %request.uri(),
    );

    let mut response = next.run(request).instrument(span).await;

    if !response.headers().contains_key(REQUEST_ID_HEADER)
        && let Ok(request_id) = HeaderValue::from_str(&tracing.request_id)
    {
        response.headers_mut().insert(REQUEST_ID_HEADER, request_id);
    }

    response
}
