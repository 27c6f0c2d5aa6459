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

//! Tacview real-time telemetry client library.
//!
//! This library provides a modular, reusable architecture for connecting to
//! a Tacview Real-Time Telemetry endpoint and parsing the ACMI text stream
//! it carries. It supports two layers that can be used independently or
//! composed together:
//!
//! - **Protocol layer**: line-oriented ACMI frame parsing (`#<offset>` frame
//!   markers, `<hex-id>,<k>=<v>,...` object upserts, `-<hex-id>` deletions).
//! - **Connection layer**: the handshake and a one-shot pull API that yields
//!   a `Header` and a lazy, finite sequence of `TimeFrame`s.
//!
//! Unlike a managed connection with built-in reconnect, [`UpstreamClient`] is
//! intentionally one-shot: the stream it returns terminates on the first I/O
//! error or clean EOF. Reconnect policy belongs to the caller (the session
//! supervisor), matching the Tacview real-time protocol's expectation that a
//! dropped connection is a normal, frequent occurrence.
//!
//! # Quick Start
//!
//! ```no_run
//! use tacview_client::{ConnectionConfig, UpstreamClient};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = UpstreamClient::new(ConnectionConfig {
//!         host: "localhost".to_string(),
//!         ..Default::default()
//!     });
//!
//!     let (header, mut frames) = client.connect().await.unwrap();
//!     println!("session header offset: {}", header.initial_frame.offset);
//!
//!     while let Some(frame) = frames.next_frame().await.unwrap() {
//!         println!("frame at offset {}", frame.offset);
//!     }
//! }
//! ```

pub mod connection;
pub mod protocol;

pub use connection::{ClientError, ConnectionConfig, FrameStream, UpstreamClient};
pub use protocol::{FrameParser, Header, ObjectUpdate, ProtocolError, TimeFrame};
