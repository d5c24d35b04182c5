//! Configuration of the mock server.
//!
//! A configuration can be built in code, read from a JSON file, or assembled by the
//! daemon from its command line.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Everything needed to start a [`MockServer`](crate::MockServer).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MockServerConfig {
    /// Address to bind; port 0 picks a free port.
    pub bind_address: String,
    /// Whether requests must carry basic credentials.
    pub auth_enabled: bool,
    /// Where the store is persisted, if anywhere.
    pub savefile: Option<PathBuf>,
    /// Name of the seeded administrator.
    pub admin_username: String,
    /// Password of the seeded administrator.
    pub admin_password: String,
    /// Whether an empty store is seeded with the administrator, built-in roles and a
    /// default index set.
    pub seed_defaults: bool,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            auth_enabled: true,
            savefile: None,
            admin_username: "admin".to_string(),
            admin_password: "admin".to_string(),
            seed_defaults: true,
        }
    }
}

impl MockServerConfig {
    /// Reads a configuration from a JSON file; absent keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let contents = std::fs::read(path)?;
        serde_json::from_slice(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Sets the bind address.
    pub fn with_bind_address(mut self, bind_address: impl Into<String>) -> Self {
        self.bind_address = bind_address.into();
        self
    }

    /// Enables or disables authentication.
    pub fn with_auth(mut self, enabled: bool) -> Self {
        self.auth_enabled = enabled;
        self
    }

    /// Persists the store at `path`.
    pub fn with_savefile(mut self, path: impl Into<PathBuf>) -> Self {
        self.savefile = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: MockServerConfig =
            serde_json::from_str(r#"{"auth_enabled": false, "savefile": "state.json"}"#).unwrap();
        assert!(!config.auth_enabled);
        assert_eq!(config.savefile, Some(PathBuf::from("state.json")));
        assert_eq!(config.bind_address, "127.0.0.1:0");
        assert_eq!(config.admin_username, "admin");
        assert!(config.seed_defaults);
    }

    #[test]
    fn builders() {
        let config = MockServerConfig::default()
            .with_bind_address("0.0.0.0:9000")
            .with_auth(false)
            .with_savefile("x.json");
        assert_eq!(config.bind_address, "0.0.0.0:9000");
        assert!(!config.auth_enabled);
        assert_eq!(config.savefile, Some(PathBuf::from("x.json")));
    }
}
