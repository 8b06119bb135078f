//! Application identity shared by the version and tracing helpers.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Identifies the running application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppIdentifier {
    /// Name of the application, typically the repository name.
    pub name: String,
    /// Version of the application, typically a CI build number.
    /// An empty version counts as no version.
    #[serde(
        default,
        deserialize_with = "non_empty",
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<String>,
}

fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let version = Option::<String>::deserialize(deserializer)?;
    Ok(version.filter(|version| !version.is_empty()))
}

impl AppIdentifier {
    /// Creates an identifier without a version.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    /// Sets the version. Empty versions are ignored.
    pub fn with_version(self, version: impl Into<String>) -> Self {
        let version = version.into();
        Self {
            version: (!version.is_empty()).then_some(version),
            ..self
        }
    }

    /// Returns `name/version`, or just `name` when there is no version.
    ///
    /// Used both as the `Server` response header and as the `User-Agent` of
    /// outgoing requests.
    pub fn user_agent(&self) -> String {
        self.to_string()
    }

    /// Returns the version, treating an empty one as absent.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref().filter(|version| !version.is_empty())
    }
}

impl fmt::Display for AppIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version() {
            Some(version) => write!(f, "{}/{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent() {
        assert_eq!(AppIdentifier::new("my-app").user_agent(), "my-app");
        assert_eq!(
            AppIdentifier::new("my-app").with_version("1.2.3").user_agent(),
            "my-app/1.2.3"
        );
        assert_eq!(AppIdentifier::new("my-app").with_version("").version, None);
    }

    #[test]
    fn test_version_is_optional_when_deserializing() {
        let app: AppIdentifier = serde_json::from_str(r#"{"name":"my-app"}"#).unwrap();
        assert_eq!(app, AppIdentifier::new("my-app"));
    }

    #[test]
    fn test_empty_version_is_absent() {
        let app: AppIdentifier =
            serde_json::from_str(r#"{"name":"my-app","version":""}"#).unwrap();
        assert_eq!(app.version, None);
        assert_eq!(app.user_agent(), "my-app");

        let app = AppIdentifier {
            name: "my-app".to_owned(),
            version: Some(String::new()),
        };
        assert_eq!(app.version(), None);
        assert_eq!(app.user_agent(), "my-app");
    }
}
