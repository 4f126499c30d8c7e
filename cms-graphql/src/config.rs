//! Settings controlling which applications are exposed and how.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// The default naming prefix: the capitalized application label.
pub const DEFAULT_PREFIX: &str = "{app}";

/// API settings.
///
/// Settings are usually loaded from JSON with the same keys the host uses for its own
/// configuration, for example
///
/// ```json
/// {
///     "APPS": ["home", "blog"],
///     "PREFIX": {"blog": ""},
///     "URL_PREFIX": {"localhost": "/home"},
///     "RELAY": false
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ApiSettings {
    /// The applications whose models are exposed, in registration order.
    #[serde(default)]
    pub apps: Vec<String>,
    /// Templates for the names of generated types.
    #[serde(default)]
    pub prefix: Prefix,
    /// Prefixes stripped from page URL paths.
    #[serde(default)]
    pub url_prefix: UrlPrefix,
    /// Use Relay-style global IDs and connections.
    #[serde(default)]
    pub relay: bool,
}

impl ApiSettings {
    /// Parse settings from a JSON object.
    pub fn from_json_str(json: &str) -> Result<Self> {
        // Settings are a dictionary; a bare array must not deserialize positionally.
        let map: Map<String, Value> =
            serde_json::from_str(json).map_err(|source| Error::ParseSettings { source })?;
        serde_json::from_value(Value::Object(map)).map_err(|source| Error::ParseSettings { source })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| Error::ReadSettings {
            path: path.into(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn with_apps<I>(mut self, apps: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.apps = apps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_relay(mut self, relay: bool) -> Self {
        self.relay = relay;
        self
    }
}

/// Naming prefix templates.
///
/// A template may contain `{app}`, which is replaced with the capitalized application label, and
/// `{cls}`, which is replaced with the model's class name.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Prefix {
    /// One template for every application.
    All(String),
    /// A template per application, with [`DEFAULT_PREFIX`] for applications not listed.
    PerApp(BTreeMap<String, String>),
}

impl Default for Prefix {
    fn default() -> Self {
        Self::PerApp(Default::default())
    }
}

impl Prefix {
    pub fn for_app(&self, app: &str) -> &str {
        match self {
            Self::All(prefix) => prefix,
            Self::PerApp(prefixes) => prefixes
                .get(app)
                .map(String::as_str)
                .unwrap_or(DEFAULT_PREFIX),
        }
    }
}

/// URL path prefixes, which are stripped from page URL paths in responses and prepended to URLs
/// in requests.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum UrlPrefix {
    All(String),
    /// A prefix per site hostname, with no prefix for hosts not listed.
    PerHost(BTreeMap<String, String>),
}

impl Default for UrlPrefix {
    fn default() -> Self {
        Self::All(String::new())
    }
}

impl UrlPrefix {
    pub fn for_host(&self, hostname: &str) -> &str {
        match self {
            Self::All(prefix) => prefix,
            Self::PerHost(prefixes) => prefixes.get(hostname).map(String::as_str).unwrap_or(""),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_settings() {
        let settings = ApiSettings::from_json_str(
            r#"{
                "APPS": ["home", "blog"],
                "PREFIX": {"blog": ""},
                "URL_PREFIX": {"localhost": "/home"},
                "RELAY": true
            }"#,
        )
        .unwrap();
        assert_eq!(settings.apps, ["home", "blog"]);
        assert_eq!(settings.prefix.for_app("blog"), "");
        assert_eq!(settings.prefix.for_app("home"), DEFAULT_PREFIX);
        assert_eq!(settings.url_prefix.for_host("localhost"), "/home");
        assert_eq!(settings.url_prefix.for_host("example.com"), "");
        assert!(settings.relay);
    }

    #[test]
    fn test_single_prefix() {
        let settings =
            ApiSettings::from_json_str(r#"{"APPS": ["home"], "PREFIX": "Cms", "URL_PREFIX": "/site"}"#)
                .unwrap();
        assert_eq!(settings.prefix.for_app("home"), "Cms");
        assert_eq!(settings.url_prefix.for_host("anything"), "/site");
        assert!(!settings.relay);
    }

    #[test]
    fn test_defaults() {
        let settings = ApiSettings::from_json_str("{}").unwrap();
        assert_eq!(settings, ApiSettings::default());
        for json in ["[]", r#"[["home"], {}, {}, true]"#, "null"] {
            assert!(
                matches!(ApiSettings::from_json_str(json), Err(Error::ParseSettings { .. })),
                "{json}"
            );
        }
    }
}
