//! Response headers that opt in to stricter browser security policies.

mod headers_config;

use axum::http::header::{self, HeaderName, HeaderValue};

pub use headers_config::{FrameOptions, SecureHeadersConfig};
use crate::{Error, Result};

/// Validated set of security headers, ready to be layered onto a router.
///
/// Every header is only added when the handler did not set it already.
#[derive(Debug, Clone)]
pub struct SecureHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecureHeaders {
    /// Returns the headers in the order they are applied.
    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }
}

impl Default for SecureHeaders {
    fn default() -> Self {
        Self {
            headers: vec![
                (
                    header::STRICT_TRANSPORT_SECURITY,
                    HeaderValue::from_static("max-age=31536000"),
                ),
                (
                    header::CONTENT_SECURITY_POLICY,
                    HeaderValue::from_static("default-src 'none'"),
                ),
                (
                    header::X_XSS_PROTECTION,
                    HeaderValue::from_static("1; mode=block"),
                ),
                (header::X_FRAME_OPTIONS, HeaderValue::from_static("deny")),
                (
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ),
            ],
        }
    }
}

impl TryFrom<&SecureHeadersConfig> for SecureHeaders {
    type Error = Error;

    fn try_from(config: &SecureHeadersConfig) -> Result<Self> {
        let hsts = HeaderValue::from_str(&config.hsts_header_value())
            .map_err(|error| Error::invalid_header("strict-transport-security", error))?;

        let mut headers = vec![(header::STRICT_TRANSPORT_SECURITY, hsts)];

        if let Some(csp) = config.csp_header_value() {
            let csp = HeaderValue::from_str(csp)
                .map_err(|error| Error::invalid_header("content-security-policy", error))?;
            headers.push((header::CONTENT_SECURITY_POLICY, csp));
        }

        headers.extend([
            (
                header::X_XSS_PROTECTION,
                HeaderValue::from_static("1; mode=block"),
            ),
            (
                header::X_FRAME_OPTIONS,
                HeaderValue::from_static(config.frame_options.as_str()),
            ),
            (
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ),
        ]);

        Ok(Self { headers })
    }
}
