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

//! Thin HTTP front door: a REST listing/detail pair plus an SSE stream per
//! server. All business logic lives in [`crate::manager`] and
//! [`crate::session`]; this module only translates between that and axum.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::manager::{ManagerError, SessionManager};
use crate::session::Session;
use crate::subscriber::Payload;
use crate::world::TrackedObject;

#[derive(Clone)]
struct AppState {
    manager: Arc<SessionManager>,
}

/// Build the relay's HTTP router: `/api/servers`, `/api/servers/{name}`, and
/// `/api/servers/{name}/events`, with permissive CORS for browser clients on
/// a different origin than the relay.
#[must_use]
pub fn router(manager: Arc<SessionManager>) -> Router {
    Router::new()
        .route("/api/servers", get(list_servers))
        .route("/api/servers/:name", get(server_detail))
        .route("/api/servers/:name/events", get(server_events))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { manager })
}

struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<ManagerError> for ApiError {
    fn from(err: ManagerError) -> Self {
        match err {
            ManagerError::NotFound(name) => {
                ApiError(StatusCode::NOT_FOUND, format!("no server named {name:?}"))
            }
        }
    }
}

async fn list_servers(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.manager.list_server_names())
}

async fn server_detail(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<crate::manager::ServerMetadata>, ApiError> {
    Ok(Json(state.manager.get_metadata(&name)?))
}

#[derive(Serialize)]
struct SessionStateData<'a> {
    session_id: &'a str,
    offset: f64,
    objects: &'a [TrackedObject],
}

#[derive(Serialize)]
struct RadarSnapshotData<'a> {
    offset: f64,
    created: &'a [TrackedObject],
    updated: &'a [TrackedObject],
    deleted: &'a [u64],
}

fn encode_event(event: &str, data: impl Serialize) -> Payload {
    serde_json::to_string(&json!({ "e": event, "d": data }))
        .expect("event envelope is always representable as json")
}

/// A late-joining subscriber's baseline: a `SESSION_STATE` event, followed
/// by a synthetic `SESSION_RADAR_SNAPSHOT` whose `created` set is the same
/// snapshot (and `updated`/`deleted` empty), so downstream consumers can
/// treat every message after the first as a normal tick.
fn encode_initial_events(session_id: &str, offset: f64, objects: &[TrackedObject]) -> Vec<Payload> {
    vec![
        encode_event(
            "SESSION_STATE",
            SessionStateData { session_id, offset, objects },
        ),
        encode_event(
            "SESSION_RADAR_SNAPSHOT",
            RadarSnapshotData {
                offset,
                created: objects,
                updated: &[],
                deleted: &[],
            },
        ),
    ]
}

async fn server_events(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Sse<EventStream>, ApiError> {
    let session = state.manager.get_or_create(&name)?;

    let (id, receiver) = session.subscribe();
    let initial = session
        .initial_state()
        .map(|(session_id, offset, objects)| encode_initial_events(&session_id, offset, &objects))
        .unwrap_or_default();

    let stream = EventStream {
        initial: initial.into_iter(),
        receiver,
        _guard: SubscriptionGuard { session, id },
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Unsubscribes from the session's registry when the stream (and hence the
/// client's connection) is dropped, regardless of how it ends.
struct SubscriptionGuard {
    session: Arc<Session>,
    id: u64,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.session.unsubscribe(self.id);
    }
}

/// Replays the subscriber's baseline snapshot (if any) before forwarding
/// its live channel, one SSE `Event` per encoded payload.
struct EventStream {
    initial: std::vec::IntoIter<Payload>,
    receiver: mpsc::Receiver<Payload>,
    _guard: SubscriptionGuard,
}

impl futures::Stream for EventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(payload) = self.initial.next() {
            return Poll::Ready(Some(Ok(Event::default().data(payload))));
        }
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(payload)) => Poll::Ready(Some(Ok(Event::default().data(payload)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
