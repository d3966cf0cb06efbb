//! Configuration for Cassie
//!
//! Centralized configuration with sensible defaults. Can be built in code
//! with [`Config::builder`] or loaded from JSON.
//!
//! ```json
//! {
//!   "cluster": { "hosts": ["10.0.0.1"], "port": 9042, "timeout": 15 },
//!   "keyspaces": { "default": "app_production" },
//!   "default_keyspace": "default",
//!   "max_prepared_statements": 1000
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::consistency::Consistency;
use crate::error::{CassieError, Result};

/// Placeholder written in place of secrets when options are logged
const SUPPRESSED: &str = "SUPPRESSED";

/// Option names that are never logged
const SECRET_OPTIONS: &[&str] = &["password", "passphrase", "credentials", "auth_provider"];

/// Options handed to the driver when it connects to the cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Contact points
    pub hosts: Vec<String>,

    /// Native protocol port
    pub port: Option<u16>,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Driver-level default consistency, used by the session when a
    /// statement carries none
    pub consistency: Option<Consistency>,

    /// Driver request timeout (seconds)
    pub timeout: Option<u64>,

    /// Driver options this crate does not interpret
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl ClusterConfig {
    /// The options as JSON with passwords and other secrets suppressed.
    /// Used for logging.
    pub fn sanitized(&self) -> JsonValue {
        let mut options = match serde_json::to_value(self) {
            Ok(JsonValue::Object(map)) => map,
            _ => Map::new(),
        };
        options.retain(|_, value| !value.is_null());
        for name in SECRET_OPTIONS {
            if let Some(value) = options.get_mut(*name) {
                *value = JsonValue::String(SUPPRESSED.to_string());
            }
        }
        JsonValue::Object(options)
    }
}

/// Main configuration for a Cassie instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Cluster Configuration
    // -------------------------------------------------------------------------
    /// Options used to connect to the cluster
    pub cluster: ClusterConfig,

    // -------------------------------------------------------------------------
    // Keyspace Configuration
    // -------------------------------------------------------------------------
    /// Abstract keyspace names mapped to actual keyspace names, so code can
    /// refer to "default" while each environment picks the real name
    pub keyspaces: BTreeMap<String, String>,

    /// Keyspace the session starts in; actual or abstract name
    pub default_keyspace: Option<String>,

    // -------------------------------------------------------------------------
    // Statement Cache Configuration
    // -------------------------------------------------------------------------
    /// Max prepared statements cached on the client
    pub max_prepared_statements: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            keyspaces: BTreeMap::new(),
            default_keyspace: None,
            max_prepared_statements: 1000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            CassieError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Actual keyspace for an abstract name; unmapped names pass through.
    pub fn keyspace(&self, name: &str) -> String {
        self.keyspaces
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Actual keyspace names
    pub fn keyspaces(&self) -> Vec<&str> {
        self.keyspaces.values().map(String::as_str).collect()
    }

    /// Abstract keyspace names
    pub fn keyspace_names(&self) -> Vec<&str> {
        self.keyspaces.keys().map(String::as_str).collect()
    }

    pub fn add_keyspace(&mut self, name: impl Into<String>, keyspace: impl Into<String>) {
        self.keyspaces.insert(name.into(), keyspace.into());
    }

    /// Actual name of the keyspace a new session should use
    pub fn session_keyspace(&self) -> Option<String> {
        self.default_keyspace.as_deref().map(|name| self.keyspace(name))
    }

    fn validate(&self) -> Result<()> {
        if let Some(name) = &self.default_keyspace {
            if name.trim().is_empty() {
                return Err(CassieError::Config(
                    "default_keyspace must not be blank".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Add a contact point
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.cluster.hosts.push(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.cluster.port = Some(port);
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.cluster.username = Some(username.into());
        self.config.cluster.password = Some(password.into());
        self
    }

    /// Replace the cluster options wholesale
    pub fn cluster(mut self, cluster: ClusterConfig) -> Self {
        self.config.cluster = cluster;
        self
    }

    /// Map an abstract keyspace name to an actual one
    pub fn keyspace(mut self, name: impl Into<String>, keyspace: impl Into<String>) -> Self {
        self.config.add_keyspace(name, keyspace);
        self
    }

    pub fn default_keyspace(mut self, name: impl Into<String>) -> Self {
        self.config.default_keyspace = Some(name.into());
        self
    }

    pub fn max_prepared_statements(mut self, count: usize) -> Self {
        self.config.max_prepared_statements = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
