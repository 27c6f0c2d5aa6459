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

//! Session supervisor: owns one upstream's world state and subscriber
//! registry, keeps the upstream connection alive across drops, and runs
//! the radar tick that turns raw updates into created/updated/deleted
//! snapshots for subscribers.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use tacview_client::{ClientError, ConnectionConfig, UpstreamClient};

use crate::config::ServerConfig;
use crate::manager::PlayerMetadata;
use crate::subscriber::{Payload, SubscriberRegistry};
use crate::world::{InitializeError, SessionState, TrackedObject};

/// Delay before retrying a dropped or failed upstream connection.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Initialize(#[from] InitializeError),
}

#[derive(Serialize)]
struct SessionStateEvent<'a> {
    session_id: &'a str,
    offset: f64,
    objects: Vec<&'a TrackedObject>,
}

#[derive(Serialize)]
struct RadarSnapshotEvent<'a> {
    offset: f64,
    created: Vec<&'a TrackedObject>,
    updated: Vec<&'a TrackedObject>,
    deleted: Vec<u64>,
}

fn encode_event(event: &str, data: impl Serialize) -> Payload {
    serde_json::to_string(&json!({ "e": event, "d": data }))
        .expect("event envelope is always representable as json")
}

/// One upstream Tacview connection, its world state, and the subscribers
/// watching it.
#[derive(Debug)]
pub struct Session {
    config: ServerConfig,
    state: RwLock<SessionState>,
    subscribers: SubscriberRegistry,
}

impl Session {
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(SessionState::new()),
            subscribers: SubscriberRegistry::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Register a new event subscriber.
    pub fn subscribe(&self) -> (u64, mpsc::Receiver<Payload>) {
        self.subscribers.add()
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.remove(id);
    }

    /// A baseline snapshot for a freshly-subscribed client: the session id,
    /// the current offset, and every live (non-deleted) object. `None`
    /// before the upstream has completed its first handshake.
    #[must_use]
    pub fn initial_state(&self) -> Option<(String, f64, Vec<TrackedObject>)> {
        let state = self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !state.active {
            return None;
        }
        let objects = state.objects.values().filter(|o| !o.deleted).cloned().collect();
        Some((state.session_id.clone(), state.offset, objects))
    }

    /// Players currently tracked: `Air`-typed objects with a `Pilot`
    /// property whose name doesn't start with their `Group` prefix (which
    /// would mark them as an AI/group member rather than a human pilot).
    #[must_use]
    pub fn player_list(&self) -> Vec<PlayerMetadata> {
        let state = self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        state
            .objects
            .values()
            .filter(|obj| !obj.deleted)
            .filter_map(|obj| {
                if !obj.types.iter().any(|t| t == "Air") {
                    return None;
                }
                let pilot = obj.properties.get("Pilot")?;
                if let Some(group) = obj.properties.get("Group") {
                    if pilot.starts_with(group.as_str()) {
                        return None;
                    }
                }
                Some(PlayerMetadata {
                    name: pilot.clone(),
                    kind: obj.properties.get("Name").cloned().unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Start the upstream reconnect loop and the radar ticker as background
    /// tasks. Idempotent only in the sense that the caller is expected to
    /// call this once per session, immediately after construction.
    pub fn spawn_supervisor(self: Arc<Self>) {
        let ticker = Arc::clone(&self);
        tokio::spawn(async move { ticker.radar_tick_loop().await });
        tokio::spawn(async move { self.reconnect_loop().await });
    }

    async fn reconnect_loop(self: Arc<Self>) {
        loop {
            match self.run_once().await {
                Ok(()) => log::warn!(
                    "[{}] upstream connection closed, reconnecting in {}s",
                    self.config.name,
                    RECONNECT_DELAY.as_secs()
                ),
                Err(err) => log::warn!(
                    "[{}] upstream connection failed: {err}, reconnecting in {}s",
                    self.config.name,
                    RECONNECT_DELAY.as_secs()
                ),
            }

            {
                let mut state = self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner);
                state.reset();
            }

            time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn run_once(self: &Arc<Self>) -> Result<(), RunError> {
        let client = UpstreamClient::new(ConnectionConfig {
            host: self.config.hostname.clone(),
            port: self.config.port,
            password: self.config.password.clone(),
            ..Default::default()
        });

        let (header, mut frames) = client.connect().await?;

        {
            let mut state = self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            state.initialize(&header)?;
        }

        log::info!("[{}] tacview session initialized", self.config.name);
        self.publish_session_state();

        while let Some(frame) = frames.next_frame().await? {
            let mut state = self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            state.update(&frame);
        }

        Ok(())
    }

    fn publish_session_state(&self) {
        let state = self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let objects: Vec<&TrackedObject> = state.objects.values().filter(|o| !o.deleted).collect();
        let payload = encode_event(
            "SESSION_STATE",
            SessionStateEvent {
                session_id: &state.session_id,
                offset: state.offset,
                objects,
            },
        );
        drop(state);
        self.subscribers.publish(payload);
    }

    async fn radar_tick_loop(self: Arc<Self>) {
        let period = Duration::from_secs(self.config.radar_refresh_rate.max(1));
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_offset = 0.0_f64;

        loop {
            interval.tick().await;
            if !self.is_active() {
                continue;
            }
            let (offset, created, updated, deleted) = self.diff_and_evict(last_offset);
            last_offset = offset;
            let payload = encode_event(
                "SESSION_RADAR_SNAPSHOT",
                RadarSnapshotEvent {
                    offset,
                    created: created.iter().collect(),
                    updated: updated.iter().collect(),
                    deleted,
                },
            );
            self.subscribers.publish(payload);
        }
    }

    fn is_active(&self) -> bool {
        self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner).active
    }

    /// Partition the object table against `since_offset` into
    /// created/updated/deleted sets, then evict deleted objects from the
    /// table. An object created and deleted within the same tick window is
    /// reported only in `deleted`, by design, matching the upstream
    /// relay's original tick semantics.
    fn diff_and_evict(&self, since_offset: f64) -> (f64, Vec<TrackedObject>, Vec<TrackedObject>, Vec<u64>) {
        let mut state = self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut created = Vec::new();
        let mut updated = Vec::new();
        let mut deleted = Vec::new();

        for obj in state.objects.values() {
            if obj.deleted {
                deleted.push(obj.id);
            } else if obj.created_at > since_offset {
                created.push(obj.clone());
            } else if obj.updated_at > since_offset {
                updated.push(obj.clone());
            }
        }

        for id in &deleted {
            state.objects.remove(id);
        }

        (state.offset, created, updated, deleted)
    }
}
