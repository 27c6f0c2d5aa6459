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

//! Realtime relay for Tacview telemetry.
//!
//! Connects to one or more upstream Tacview real-time telemetry servers
//! (see [`tacview_client`]), maintains per-server world state, and fans
//! deltas out to browser clients over Server-Sent Events.
//!
//! - [`config`]: JSON configuration for the bind address and upstream servers.
//! - [`world`]: the tracked-object table and frame-application rules.
//! - [`session`]: per-upstream supervisor, reconnect loop plus radar ticker.
//! - [`subscriber`]: non-blocking, evict-on-full subscriber fan-out.
//! - [`manager`]: maps configured server names to lazily-started sessions.
//! - [`http`]: the thin axum HTTP/SSE front door.

pub mod config;
pub mod error;
pub mod http;
pub mod manager;
pub mod session;
pub mod subscriber;
pub mod world;

pub use error::Error;
