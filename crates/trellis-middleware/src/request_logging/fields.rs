use axum::extract::{MatchedPath, Request};
use serde_json::Value;

use crate::tracing_headers::tracing_from_request;

/// Key-value pairs attached to a log record.
pub type Fields = serde_json::Map<String, Value>;

/// Returns request-specific log fields.
///
/// Contains the method, the matched route (when routing has happened), the
/// URL as sent and the tracing IDs. Useful for annotating every log line
/// emitted while serving the request, not only the final request log.
pub fn context_fields(request: &mut Request) -> Fields {
    let tracing = tracing_from_request(request);

    let mut fields = Fields::new();
    fields.insert("method".to_owned(), request.method().as_str().into());

    if let Some(route) = request.extensions().get::<MatchedPath>() {
        fields.insert("route".to_owned(), route.as_str().into());
    }

    let url = request
        .uri()
        .path_and_query()
        .map_or_else(|| request.uri().path(), |pq| pq.as_str());
    fields.insert("url".to_owned(), url.into());
    fields.insert("x-request-id".to_owned(), tracing.request_id.into());

    if let Some(session_id) = tracing.adhoc_session_id {
        fields.insert("x-session-id".to_owned(), session_id.into());
    }

    fields
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    #[test]
    fn test_returns_request_information() {
        let mut request = axum::http::Request::builder()
            .method("GET")
            .uri("/foo/bar?baz")
            .header("user-agent", "Safari")
            .body(Body::empty())
            .unwrap();

        let fields = context_fields(&mut request);

        assert_eq!(fields["method"], "GET");
        assert_eq!(fields["url"], "/foo/bar?baz");
        assert!(fields["x-request-id"].is_string());
        assert!(!fields.contains_key("route"));
        assert!(!fields.contains_key("headers"));
        assert!(!fields.contains_key("x-session-id"));
    }

    #[test]
    fn test_includes_adhoc_session_id() {
        let mut request = axum::http::Request::builder()
            .uri("/")
            .header("x-request-id", "abc")
            .header("x-session-id", "session-1")
            .body(Body::empty())
            .unwrap();

        let fields = context_fields(&mut request);

        assert_eq!(fields["x-request-id"], "abc");
        assert_eq!(fields["x-session-id"], "session-1");
    }
}
