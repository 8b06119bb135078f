//! Cloneable HTTP error carried through the response extensions.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use axum::Json;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};

type SharedSource = Arc<dyn StdError + Send + Sync + 'static>;

/// Error raised by a handler or middleware further down the chain.
///
/// Rendering an `HttpError` produces a provisional response and stores the
/// error itself in the response extensions, where the error handling
/// middleware picks it up, logs it and finalises the body. Errors without a
/// status are treated as internal server errors.
#[derive(Clone, Debug)]
#[must_use = "errors do nothing unless returned"]
pub struct HttpError {
    status: Option<StatusCode>,
    message: Cow<'static, str>,
    body: Option<serde_json::Value>,
    source: Option<SharedSource>,
}

impl HttpError {
    /// Creates an error with `message` and no status.
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status: None,
            message: message.into(),
            body: None,
            source: None,
        }
    }

    /// Creates an error whose message is the canonical reason of `status`.
    pub fn from_status(status: StatusCode) -> Self {
        Self::new(status.canonical_reason().unwrap_or_default()).with_status(status)
    }

    /// Creates a `500 Internal Server Error` with `message`.
    ///
    /// The message is logged but never sent to the client.
    pub fn internal(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(message).with_status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Creates an error that is sent as JSON unless the client prefers text.
    ///
    /// Clients that ask for `text/plain` receive `message` instead.
    pub fn json(
        status: StatusCode,
        message: impl Into<Cow<'static, str>>,
        body: serde_json::Value,
    ) -> Self {
        Self::new(message).with_status(status).with_body(body)
    }

    /// Sets the response status.
    #[inline]
    pub fn with_status(self, status: StatusCode) -> Self {
        Self {
            status: Some(status),
            ..self
        }
    }

    /// Replaces the message.
    #[inline]
    pub fn with_message(self, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
            ..self
        }
    }

    /// Attaches a JSON body.
    #[inline]
    pub fn with_body(self, body: serde_json::Value) -> Self {
        Self {
            body: Some(body),
            ..self
        }
    }

    /// Attaches the underlying cause.
    pub fn with_source(self, source: impl StdError + Send + Sync + 'static) -> Self {
        Self {
            source: Some(Arc::new(source)),
            ..self
        }
    }

    /// Returns the explicit status, if any.
    #[inline]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Returns the status the response is sent with.
    #[inline]
    pub fn response_status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Returns `true` if the response status is 5xx.
    #[inline]
    pub fn is_server_error(&self) -> bool {
        self.response_status().is_server_error()
    }

    /// Returns the message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the JSON body, if any.
    #[inline]
    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    /// Renders the client-facing response.
    ///
    /// Server errors get an empty body. Client errors expose their JSON body
    /// or, when there is none or `prefer_text` is set, their message.
    pub(crate) fn render(&self, prefer_text: bool) -> Response {
        let status = self.response_status();
        if status.is_server_error() {
            return status.into_response();
        }

        match &self.body {
            Some(body) if !prefer_text => (status, Json(body.clone())).into_response(),
            _ if self.message.is_empty() => status.into_response(),
            _ => (status, self.message.to_string()).into_response(),
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self.message.as_ref() {
            "" => self.response_status().canonical_reason().unwrap_or("Unknown error"),
            message => message,
        };

        f.write_str(message)?;
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }

        Ok(())
    }
}

impl StdError for HttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = self.render(false);
        response.extensions_mut().insert(Thrown(Arc::new(self)));
        response
    }
}

impl From<StatusCode> for HttpError {
    #[inline]
    fn from(status: StatusCode) -> Self {
        Self::from_status(status)
    }
}

impl From<tower::BoxError> for HttpError {
    fn from(error: tower::BoxError) -> Self {
        let error = match error.downcast::<HttpError>() {
            Ok(error) => return *error,
            Err(error) => error,
        };

        if error.is::<tower::timeout::error::Elapsed>() {
            return Self::new("Request timed out").with_status(StatusCode::REQUEST_TIMEOUT);
        }

        Self {
            status: None,
            message: Cow::Owned(error.to_string()),
            body: None,
            source: Some(Arc::from(error)),
        }
    }
}

impl From<anyhow::Error> for HttpError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<HttpError>() {
            Ok(error) => error,
            Err(error) => Self::from(tower::BoxError::from(error)),
        }
    }
}

/// Response extension holding the error a response was rendered from.
#[derive(Debug, Clone)]
pub struct Thrown(pub(crate) Arc<HttpError>);

impl Thrown {
    /// Returns the error.
    #[inline]
    pub fn error(&self) -> &HttpError {
        &self.0
    }
}

/// Returns the error `response` was rendered from, if any.
///
/// Middleware placed outside the error handler uses this to enrich logs and
/// metrics with the original failure.
pub fn thrown(response: &Response) -> Option<&HttpError> {
    response.extensions().get::<Thrown>().map(Thrown::error)
}

/// Returns `true` if the `Accept` header ranks `text/plain` strictly above
/// `application/json`.
pub(crate) fn prefers_text(headers: &HeaderMap) -> bool {
    let accept = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect::<Vec<_>>()
        .join(",");

    if accept.trim().is_empty() {
        return false;
    }

    let text = preference(&accept, "text", "plain");
    let json = preference(&accept, "application", "json");
    match (text, json) {
        (Some(text), Some(json)) => text > json,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Ranking of the best media range in `accept` matching `kind/subtype`:
/// quality, then specificity, then earlier position.
fn preference(accept: &str, kind: &str, subtype: &str) -> Option<(u16, u8, std::cmp::Reverse<usize>)> {
    accept
        .split(',')
        .enumerate()
        .filter_map(|(position, range)| {
            let mut params = range.split(';');
            let media = params.next()?.trim();
            let (range_kind, range_subtype) = media.split_once('/')?;

            let specificity = match (range_kind, range_subtype) {
                (k, s) if k.eq_ignore_ascii_case(kind) && s.eq_ignore_ascii_case(subtype) => 2,
                (k, "*") if k.eq_ignore_ascii_case(kind) => 1,
                ("*", "*") => 0,
                _ => return None,
            };

            let quality = params
                .filter_map(|param| param.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .map_or(1000, |q| (q.clamp(0.0, 1.0) * 1000.0) as u16);

            (quality > 0).then_some((quality, specificity, std::cmp::Reverse(position)))
        })
        .max()
}
