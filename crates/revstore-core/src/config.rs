//! Process configuration: server profiles, the table-name prefix, and the
//! config-merge utility.
//!
//! A [`StoreConfig`] is built once at startup (in code or from JSON) and
//! handed to a [`ConnectionManager`](crate::connection::ConnectionManager).

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::types::Role;

fn default_timeout_ms() -> u64 {
    20_000
}

/// A host and port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

/// Connection parameters for one named server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProfile {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Connect and read timeout, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Read-only replica used for [`Role::Secondary`] connections.
    #[serde(default)]
    pub replica: Option<Endpoint>,
}

impl ServerProfile {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            user: None,
            password: None,
            timeout_ms: default_timeout_ms(),
            replica: None,
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        // Round up so a sub-millisecond timeout never becomes zero.
        let ms = timeout.as_nanos().div_ceil(1_000_000);
        self.timeout_ms = u64::try_from(ms).unwrap_or(u64::MAX);
        self
    }

    pub fn with_replica(mut self, host: impl Into<String>, port: u16) -> Self {
        self.replica = Some(Endpoint {
            host: host.into(),
            port,
        });
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The endpoint to dial for `role`.
    pub fn endpoint(&self, role: Role) -> Endpoint {
        match (role, &self.replica) {
            (Role::Secondary, Some(replica)) => replica.clone(),
            _ => Endpoint {
                host: self.host.clone(),
                port: self.port,
            },
        }
    }
}

/// Named server profiles. Written at setup, read on every acquisition.
#[derive(Debug, Default)]
pub struct ServerRegistry {
    servers: RwLock<HashMap<String, ServerProfile>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `profile` under `name`. An existing entry is only replaced when
    /// `update` is set; returns whether anything was stored.
    pub fn register(&self, name: &str, profile: ServerProfile, update: bool) -> bool {
        let mut servers = self.servers.write();
        if servers.contains_key(name) && !update {
            return false;
        }
        servers.insert(name.to_string(), profile);
        true
    }

    pub fn get(&self, name: &str) -> Option<ServerProfile> {
        self.servers.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.servers.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.servers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Serializable process-wide settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Prepended to every resolved database name.
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub servers: HashMap<String, ServerProfile>,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn server(mut self, name: impl Into<String>, profile: ServerProfile) -> Self {
        self.servers.insert(name.into(), profile);
        self
    }

    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Move the profiles into a registry.
    pub fn into_registry(self) -> (String, ServerRegistry) {
        let registry = ServerRegistry::new();
        for (name, profile) in self.servers {
            registry.register(&name, profile, true);
        }
        (self.prefix, registry)
    }
}

/// Right-biased deep merge: objects merge key by key, anything else in
/// `overrides` replaces the base value.
pub fn merge(base: &Value, overrides: &Value) -> Value {
    match (base, overrides) {
        (Value::Object(b), Value::Object(o)) => {
            let mut out = b.clone();
            for (k, v) in o {
                let merged = match out.get(k) {
                    Some(existing) => merge(existing, v),
                    None => v.clone(),
                };
                out.insert(k.clone(), merged);
            }
            Value::Object(out)
        }
        (_, o) => o.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_register_respects_update_flag() {
        let reg = ServerRegistry::new();
        assert!(reg.register("default", ServerProfile::new("a", 1), false));
        assert!(!reg.register("default", ServerProfile::new("b", 2), false));
        assert_eq!(reg.get("default").unwrap().host, "a");

        assert!(reg.register("default", ServerProfile::new("b", 2), true));
        assert_eq!(reg.get("default").unwrap().host, "b");
        assert!(reg.get("other").is_none());
    }

    #[test]
    fn test_endpoint_by_role() {
        let p = ServerProfile::new("db1", 28015);
        assert_eq!(p.endpoint(Role::Secondary).host, "db1");

        let p = p.with_replica("db2", 28016);
        assert_eq!(p.endpoint(Role::Primary).host, "db1");
        assert_eq!(p.endpoint(Role::Secondary).port, 28016);
    }

    #[test]
    fn test_sub_second_timeout_is_kept() {
        let p = ServerProfile::new("h", 1).with_timeout(Duration::from_millis(500));
        assert_eq!(p.timeout(), Duration::from_millis(500));

        let p = ServerProfile::new("h", 1).with_timeout(Duration::from_micros(10));
        assert_eq!(p.timeout(), Duration::from_millis(1));
    }

    #[test]
    fn test_config_from_json() {
        let conf = StoreConfig::from_json(
            r#"{
                "prefix": "staging_",
                "servers": {
                    "default": {"host": "localhost", "port": 28015},
                    "reports": {"host": "r1", "port": 28015, "timeout_ms": 5000,
                                "replica": {"host": "r2", "port": 28015}}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(conf.prefix, "staging_");
        assert_eq!(conf.servers["default"].timeout(), Duration::from_secs(20));
        assert_eq!(conf.servers["reports"].timeout(), Duration::from_secs(5));

        let (prefix, registry) = conf.into_registry();
        assert_eq!(prefix, "staging_");
        assert_eq!(registry.names(), vec!["default", "reports"]);
    }

    #[test]
    fn test_config_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"servers": {{"default": {{"host": "h", "port": 1}}}}}}"#).unwrap();
        let conf = StoreConfig::load(file.path()).unwrap();
        assert_eq!(conf.prefix, "");
        assert_eq!(conf.servers["default"].port, 1);
    }

    #[test]
    fn test_bad_config_is_config_error() {
        assert!(matches!(
            StoreConfig::from_json("{\"servers\": 3}"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_merge_is_deep_and_right_biased() {
        let base = json!({"a": 1, "nested": {"x": 1, "y": 2}, "list": [1, 2]});
        let over = json!({"b": 2, "nested": {"y": 3}, "list": [9]});
        assert_eq!(
            merge(&base, &over),
            json!({"a": 1, "b": 2, "nested": {"x": 1, "y": 3}, "list": [9]})
        );
    }
}
