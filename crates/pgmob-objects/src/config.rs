//! Cluster handle configuration.
//!
//! Built in code with the builder methods below, or loaded from JSON:
//!
//! ```
//! use pgmob_objects::ClusterConfig;
//!
//! let config = ClusterConfig::from_json(r#"{"become_role": "admin", "server_version": "13.4"}"#)
//!     .unwrap();
//! assert_eq!(config.default_schema, "public");
//! assert_eq!(config.become_role.as_deref(), Some("admin"));
//! ```

use crate::collection::KeyContext;
use pgmob_core::ServerVersion;
use pgmob_core::error::Result;
use serde::{Deserialize, Serialize};

/// Settings for a [`Cluster`](crate::Cluster).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Schema whose qualifier is elided from collection keys (default: `public`)
    pub default_schema: String,
    /// Role to `SET ROLE` to right after connecting
    pub become_role: Option<String>,
    /// Known server version; skips detection when set
    pub server_version: Option<ServerVersion>,
    /// Application name (visible in pg_stat_activity)
    pub application_name: Option<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            default_schema: "public".to_string(),
            become_role: None,
            server_version: None,
            application_name: None,
        }
    }
}

impl ClusterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Set the default schema.
    pub fn default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = schema.into();
        self
    }

    /// Switch to `role` after connecting.
    pub fn become_role(mut self, role: impl Into<String>) -> Self {
        self.become_role = Some(role.into());
        self
    }

    /// Use a fixed server version instead of asking the server.
    pub fn server_version(mut self, version: ServerVersion) -> Self {
        self.server_version = Some(version);
        self
    }

    /// Set the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    pub fn key_context(&self) -> KeyContext {
        KeyContext::new(self.default_schema.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgmob_core::Error;

    #[test]
    fn test_defaults() {
        let config = ClusterConfig::default();
        assert_eq!(config.default_schema, "public");
        assert!(config.become_role.is_none());
        assert!(config.server_version.is_none());
    }

    #[test]
    fn test_builder() {
        let config = ClusterConfig::new()
            .default_schema("app")
            .become_role("admin")
            .server_version(ServerVersion::new(12, 3))
            .application_name("pgmob");
        assert_eq!(config.key_context().default_schema(), "app");
        assert_eq!(config.server_version, Some(ServerVersion::new(12, 3)));
        assert_eq!(config.application_name.as_deref(), Some("pgmob"));
    }

    #[test]
    fn test_from_json() {
        let config = ClusterConfig::from_json(r#"{"default_schema": "app"}"#).unwrap();
        assert_eq!(config.default_schema, "app");

        let err = ClusterConfig::from_json(r#"{"server_version": "thirteen"}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(matches!(ClusterConfig::from_json("{"), Err(Error::Config(_))));
    }
}
