use std::collections::BTreeMap;

use axum::http::HeaderMap;
use serde_json::Value;

use super::Fields;

/// Value substituted for sensitive headers in request logs.
///
/// Deliberately not a plausible header value.
pub const REDACTED_HEADER: &str = "*** REDACTED ***";

/// Headers that typically carry credentials such as tokens or session
/// cookies.
pub const SENSITIVE_HEADERS: [&str; 4] = [
    "authenticated-user",
    "authorization",
    "cookie",
    "x-oidc-identity",
];

/// Substitutions applied to request headers before they are logged.
///
/// Keys are lower-case header names. A `Some` replacement masks the value,
/// `None` drops the header from the log entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderReplacements {
    replacements: BTreeMap<String, Option<String>>,
}

impl HeaderReplacements {
    /// Creates an empty set; every header is logged as is.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Masks every header in [`SENSITIVE_HEADERS`] with [`REDACTED_HEADER`].
    pub fn sensitive() -> Self {
        SENSITIVE_HEADERS
            .into_iter()
            .fold(Self::new(), |replacements, name| {
                replacements.replace(name, REDACTED_HEADER)
            })
    }

    /// Logs `replacement` in place of the value of `name`.
    pub fn replace(mut self, name: &str, replacement: impl Into<String>) -> Self {
        self.replacements
            .insert(name.to_ascii_lowercase(), Some(replacement.into()));
        self
    }

    /// Leaves `name` out of the log.
    pub fn omit(mut self, name: &str) -> Self {
        self.replacements.insert(name.to_ascii_lowercase(), None);
        self
    }

    /// Returns the headers to log. Repeated headers are joined with `, `.
    pub fn apply(&self, headers: &HeaderMap) -> Fields {
        let mut logged = Fields::new();

        for name in headers.keys() {
            let value = match self.replacements.get(name.as_str()) {
                Some(Some(replacement)) => replacement.clone(),
                Some(None) => continue,
                None => headers
                    .get_all(name)
                    .iter()
                    .map(|value| String::from_utf8_lossy(value.as_bytes()))
                    .collect::<Vec<_>>()
                    .join(", "),
            };

            logged.insert(name.as_str().to_owned(), Value::String(value));
        }

        logged
    }
}
