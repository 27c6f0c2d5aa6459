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

//! Session manager: maps configured server names to lazily-started
//! [`Session`]s and surfaces per-server metadata for the HTTP layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::session::Session;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("no server named {0:?} is configured")]
    NotFound(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerMetadata {
    pub name: String,
    pub ground_unit_modes: Vec<String>,
    pub players: Vec<PlayerMetadata>,
    /// Ground-controlled-intercept roster. Always empty: the chat-bot
    /// integration that populates this in the original relay is out of
    /// scope here, but the field stays on the wire for client compatibility.
    pub gcis: Vec<String>,
}

/// Owns every configured server's [`Session`], starting each one's
/// supervisor on first access rather than eagerly at construction.
#[derive(Debug)]
pub struct SessionManager {
    servers: Vec<ServerConfig>,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionManager {
    #[must_use]
    pub fn new(servers: Vec<ServerConfig>) -> Self {
        Self {
            servers,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn list_server_names(&self) -> Vec<String> {
        self.servers.iter().map(|s| s.name.clone()).collect()
    }

    fn find_config(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Return the named server's session, starting its upstream supervisor
    /// and radar ticker on first call.
    pub fn get_or_create(&self, name: &str) -> Result<Arc<Session>, ManagerError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(existing) = sessions.get(name) {
            return Ok(Arc::clone(existing));
        }

        let config = self
            .find_config(name)
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))?
            .clone();

        let session = Arc::new(Session::new(config));
        Arc::clone(&session).spawn_supervisor();
        sessions.insert(name.to_string(), Arc::clone(&session));
        Ok(session)
    }

    /// Server metadata for the list/detail HTTP endpoints. Calls
    /// `get_or_create` for its player list, so a server queried before its
    /// session exists (e.g. a request racing process startup) starts the
    /// session's supervisor here rather than returning an empty player list.
    pub fn get_metadata(&self, name: &str) -> Result<ServerMetadata, ManagerError> {
        let config = self
            .find_config(name)
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))?;

        let mut ground_unit_modes = Vec::new();
        if config.enable_enemy_ground_units {
            ground_unit_modes.push("enemy".to_string());
        }
        if config.enable_friendly_ground_units {
            ground_unit_modes.push("friendly".to_string());
        }

        let players = self.get_or_create(name)?.player_list();

        Ok(ServerMetadata {
            name: config.name.clone(),
            ground_unit_modes,
            players,
            gcis: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(name: &str) -> ServerConfig {
        ServerConfig {
            name: name.to_string(),
            hostname: "127.0.0.1".to_string(),
            port: 0,
            password: None,
            radar_refresh_rate: 5,
            enable_enemy_ground_units: true,
            enable_friendly_ground_units: false,
        }
    }

    #[test]
    fn unknown_server_name_yields_not_found() {
        let manager = SessionManager::new(vec![server("blue-flag")]);
        assert!(matches!(
            manager.get_metadata("red-flag"),
            Err(ManagerError::NotFound(_))
        ));
    }

    // get_or_create spawns the session's supervisor tasks, which requires a
    // tokio runtime; those tasks immediately fail to dial 127.0.0.1:0 and
    // back off, which is fine, we never await them here.
    #[tokio::test]
    async fn get_or_create_returns_same_session_on_repeat_calls() {
        let manager = SessionManager::new(vec![server("blue-flag")]);
        let a = manager.get_or_create("blue-flag").unwrap();
        let b = manager.get_or_create("blue-flag").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn metadata_reports_configured_ground_unit_modes() {
        let manager = SessionManager::new(vec![server("blue-flag")]);
        let metadata = manager.get_metadata("blue-flag").unwrap();
        assert_eq!(metadata.ground_unit_modes, vec!["enemy".to_string()]);
        assert!(metadata.players.is_empty());
    }
}
