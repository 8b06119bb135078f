use std::any::Any;
use std::future::ready;

use axum::response::{IntoResponse, Response};
use futures::future::{BoxFuture, FutureExt};

use super::HttpError;
use crate::utility::tracing_targets::{ERROR_HANDLING, PANIC};

type Panic = Box<dyn Any + Send + 'static>;

/// Transforms a caught panic into an internal [`HttpError`] response.
///
/// Intended for [`tower_http::catch_panic::CatchPanicLayer::custom`]. A panic
/// raised with an [`HttpError`] payload is rendered as that error.
pub fn catch_panic(payload: Panic) -> Response {
    if let Some(error) = payload.downcast_ref::<HttpError>() {
        tracing::error!(target: PANIC, error = %error, "service panic");
        return error.clone().into_response();
    }

    let message = panic_message(&*payload);
    tracing::error!(target: PANIC, panic = %message, "service panic");
    HttpError::internal(message).into_response()
}

/// Transforms a [`tower::BoxError`] into an [`HttpError`] response.
///
/// Intended for [`axum::error_handling::HandleErrorLayer`].
pub fn handle_error(error: tower::BoxError) -> BoxFuture<'static, Response> {
    let error = HttpError::from(error);
    tracing::debug!(target: ERROR_HANDLING, error = %error, "service error");
    ready(error.into_response()).boxed()
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(error) = payload.downcast_ref::<HttpError>() {
        error.to_string()
    } else {
        "unknown panic type".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::error_handling::thrown;

    #[test]
    fn test_panic_message_payloads() {
        let owned: Panic = Box::new(String::from("owned"));
        let borrowed: Panic = Box::new("borrowed");
        let opaque: Panic = Box::new(7_u8);

        assert_eq!(panic_message(&*owned), "owned");
        assert_eq!(panic_message(&*borrowed), "borrowed");
        assert_eq!(panic_message(&*opaque), "unknown panic type");
    }

    #[test]
    fn test_catch_panic_is_internal_error() {
        let response = catch_panic(Box::new("handler exploded"));

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(thrown(&response).unwrap().message(), "handler exploded");
    }

    #[test]
    fn test_catch_panic_with_http_error_payload() {
        let response = catch_panic(Box::new(HttpError::from(StatusCode::IM_A_TEAPOT)));
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn test_handle_error_renders_timeout() {
        let error: tower::BoxError = Box::new(tower::timeout::error::Elapsed::new());
        let response = handle_error(error).await;
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
