// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Relay configuration: the HTTP bind address and the set of upstream
//! Tacview real-time servers to connect to, loaded from a JSON file named
//! on the command line.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

fn default_radar_refresh_rate() -> u64 {
    5
}

/// One upstream Tacview real-time server to relay.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Name this server is addressed by in the HTTP API (`/api/servers/{name}`).
    pub name: String,
    pub hostname: String,
    /// Upstream port. `0` (or omitted) resolves to the Tacview default, 42674.
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    /// Radar tick period, in seconds.
    #[serde(default = "default_radar_refresh_rate")]
    pub radar_refresh_rate: u64,
    #[serde(default)]
    pub enable_enemy_ground_units: bool,
    #[serde(default)]
    pub enable_friendly_ground_units: bool,
}

/// Top-level relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the HTTP front door listens on, e.g. `"0.0.0.0:8080"`.
    pub bind: String,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let json = r#"{
            "bind": "0.0.0.0:8080",
            "servers": [
                { "name": "blue-flag", "hostname": "10.0.0.5" }
            ]
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.bind, "0.0.0.0:8080");
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].port, 0);
        assert_eq!(config.servers[0].radar_refresh_rate, 5);
        assert!(!config.servers[0].enable_enemy_ground_units);
    }

    #[test]
    fn parses_full_server_entry() {
        let json = r#"{
            "name": "blue-flag",
            "hostname": "10.0.0.5",
            "port": 42674,
            "password": "hunter2",
            "radar_refresh_rate": 2,
            "enable_enemy_ground_units": true,
            "enable_friendly_ground_units": false
        }"#;
        let server: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(server.port, 42674);
        assert_eq!(server.password.as_deref(), Some("hunter2"));
        assert_eq!(server.radar_refresh_rate, 2);
        assert!(server.enable_enemy_ground_units);
    }

    #[test]
    fn missing_file_yields_io_error() {
        let err = Config::load(Path::new("/nonexistent/path/to/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
