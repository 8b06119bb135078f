//! Security headers configuration.

#[cfg(feature = "config")]
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

/// Security headers configuration for API responses.
///
/// The defaults assume the application does not mix HTTP and HTTPS, serves
/// API responses rather than browser-rendered pages, and sets accurate
/// `Content-Type` headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct SecureHeadersConfig {
    /// HTTP Strict Transport Security (HSTS) max age in seconds.
    /// Browsers ignore the header on plain HTTP, so local testing still works.
    #[cfg_attr(
        feature = "config",
        arg(long = "hsts-max-age", env = "HSTS_MAX_AGE", default_value = "31536000")
    )]
    pub hsts_max_age_seconds: u64,

    /// Whether to include subdomains in the HSTS policy.
    #[cfg_attr(
        feature = "config",
        arg(long = "hsts-include-subdomains", env = "HSTS_INCLUDE_SUBDOMAINS")
    )]
    pub hsts_include_subdomains: bool,

    /// Content Security Policy directives. Empty disables the header.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "content-security-policy",
            env = "CONTENT_SECURITY_POLICY",
            default_value = "default-src 'none'"
        )
    )]
    pub content_security_policy: String,

    /// X-Frame-Options header value.
    #[cfg_attr(
        feature = "config",
        arg(long = "frame-options", env = "FRAME_OPTIONS", value_enum, default_value = "deny")
    )]
    pub frame_options: FrameOptions,
}

impl Default for SecureHeadersConfig {
    fn default() -> Self {
        Self {
            hsts_max_age_seconds: 31_536_000, // 1 year
            hsts_include_subdomains: false,
            content_security_policy: "default-src 'none'".to_owned(),
            frame_options: FrameOptions::Deny,
        }
    }
}

impl SecureHeadersConfig {
    /// Returns the HSTS header value.
    pub fn hsts_header_value(&self) -> String {
        if self.hsts_include_subdomains {
            format!("max-age={}; includeSubDomains", self.hsts_max_age_seconds)
        } else {
            format!("max-age={}", self.hsts_max_age_seconds)
        }
    }

    /// Returns the CSP header value if configured.
    pub fn csp_header_value(&self) -> Option<&str> {
        Some(self.content_security_policy.trim()).filter(|csp| !csp.is_empty())
    }
}

/// X-Frame-Options header values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum FrameOptions {
    /// The page cannot be displayed in a frame.
    #[default]
    Deny,
    /// The page can only be framed by pages of the same origin.
    SameOrigin,
}

impl FrameOptions {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deny => "deny",
            Self::SameOrigin => "sameorigin",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsts_header_value() {
        let config = SecureHeadersConfig::default();
        assert_eq!(config.hsts_header_value(), "max-age=31536000");

        let config = SecureHeadersConfig {
            hsts_include_subdomains: true,
            ..Default::default()
        };
        assert_eq!(
            config.hsts_header_value(),
            "max-age=31536000; includeSubDomains"
        );
    }

    #[test]
    fn test_empty_csp_is_disabled() {
        assert_eq!(
            SecureHeadersConfig::default().csp_header_value(),
            Some("default-src 'none'")
        );

        let config = SecureHeadersConfig {
            content_security_policy: "  ".to_owned(),
            ..Default::default()
        };
        assert_eq!(config.csp_header_value(), None);
    }

    #[test]
    fn test_frame_options() {
        assert_eq!(FrameOptions::Deny.as_str(), "deny");
        assert_eq!(FrameOptions::SameOrigin.as_str(), "sameorigin");
    }
}
