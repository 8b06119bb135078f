//! Application version response headers.

use axum::http::header::{self, HeaderName, HeaderValue};

use crate::app::AppIdentifier;
use crate::{Error, Result};

/// Header carrying the application version.
pub const API_VERSION_HEADER: HeaderName = HeaderName::from_static("x-api-version");

/// `Server` and `X-Api-Version` response headers for an application.
///
/// `Server` is `name/version`, or `name` when there is no version;
/// `X-Api-Version` is only sent when a version is known. Headers already set
/// by a handler are left alone. Has no dependencies on other middleware and
/// can be layered in any order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionHeaders {
    server: HeaderValue,
    api_version: Option<HeaderValue>,
}

impl VersionHeaders {
    /// Builds the headers for `app`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or version cannot be sent as a header.
    pub fn new(app: &AppIdentifier) -> Result<Self> {
        let server = HeaderValue::from_str(&app.user_agent())
            .map_err(|error| Error::invalid_header("server", error))?;

        let api_version = app
            .version()
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|error| Error::invalid_header("x-api-version", error))?;

        Ok(Self {
            server,
            api_version,
        })
    }

    /// Returns the headers in the order they are applied.
    pub fn headers(&self) -> Vec<(HeaderName, HeaderValue)> {
        let mut headers = vec![(header::SERVER, self.server.clone())];
        if let Some(api_version) = &self.api_version {
            headers.push((API_VERSION_HEADER, api_version.clone()));
        }
        headers
    }
}

impl TryFrom<&AppIdentifier> for VersionHeaders {
    type Error = Error;

    fn try_from(app: &AppIdentifier) -> Result<Self> {
        Self::new(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_versioned_app() -> anyhow::Result<()> {
        let app = AppIdentifier::new("my-app").with_version("1.2.3");
        let headers = VersionHeaders::new(&app)?.headers();

        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].0, header::SERVER);
        assert_eq!(headers[0].1, "my-app/1.2.3");
        assert_eq!(headers[1].0, API_VERSION_HEADER);
        assert_eq!(headers[1].1, "1.2.3");
        Ok(())
    }

    #[test]
    fn test_unversioned_app() -> anyhow::Result<()> {
        let headers = VersionHeaders::new(&AppIdentifier::new("my-app"))?.headers();

        assert_eq!(headers, [(header::SERVER, HeaderValue::from_static("my-app"))]);
        Ok(())
    }

    #[test]
    fn test_empty_version_sends_no_version() -> anyhow::Result<()> {
        let app: AppIdentifier = serde_json::from_str(r#"{"name":"my-app","version":""}"#)?;
        let headers = VersionHeaders::new(&app)?.headers();
        assert_eq!(headers, [(header::SERVER, HeaderValue::from_static("my-app"))]);

        let app = AppIdentifier {
            name: "my-app".to_owned(),
            version: Some(String::new()),
        };
        let headers = VersionHeaders::new(&app)?.headers();
        assert_eq!(headers, [(header::SERVER, HeaderValue::from_static("my-app"))]);
        Ok(())
    }

    #[test]
    fn test_rejects_invalid_version() {
        let app = AppIdentifier::new("my-app").with_version("1.0\r\n");
        let error = VersionHeaders::new(&app).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidHeader);
    }
}
