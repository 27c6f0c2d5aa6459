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

//! World state: the authoritative, per-upstream table of tracked objects.
//!
//! Applies Tacview frame deltas to a keyed object table, tracking per-object
//! create/update offsets that the radar tick later uses to classify changes.

use std::collections::HashMap;

use serde::Serialize;
use tacview_client::{Header, TimeFrame};
use thiserror::Error;

/// Errors raised while applying a single numeric field.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("invalid value for field '{field}': {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Errors raised by [`SessionState::initialize`].
#[derive(Debug, Error)]
pub enum InitializeError {
    #[error("tacview initial time frame is missing the global object")]
    MissingGlobalObject,
    #[error(transparent)]
    Format(#[from] FormatError),
}

/// A single tracked simulation entity.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedObject {
    pub id: u64,
    pub types: Vec<String>,
    pub properties: HashMap<String, String>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub heading: f64,

    /// Awaiting eviction at the next radar tick. Never serialised.
    #[serde(skip)]
    pub deleted: bool,
    /// Frame offset at which this object first appeared.
    #[serde(skip)]
    pub created_at: f64,
    /// Frame offset of the most recent update (including the one that
    /// created it).
    #[serde(skip)]
    pub updated_at: f64,
}

impl TrackedObject {
    fn new(id: u64, offset: f64) -> Self {
        Self {
            id,
            types: Vec::new(),
            properties: HashMap::new(),
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            heading: 0.0,
            deleted: false,
            created_at: offset,
            updated_at: offset,
        }
    }

    /// Apply one frame's worth of properties (or a deletion) to this
    /// object. A parse failure on the `T` coordinate record aborts only the
    /// remaining properties of *this* call; properties already applied
    /// stay applied.
    fn apply(
        &mut self,
        offset: f64,
        deleted: bool,
        properties: &[(String, String)],
        coord_base: (f64, f64),
    ) -> Result<(), FormatError> {
        if deleted {
            self.deleted = true;
            self.updated_at = offset;
            return Ok(());
        }

        for (key, value) in properties {
            match key.as_str() {
                "T" => self.apply_location(value, coord_base)?,
                "Type" => self.types = value.split('+').map(str::to_string).collect(),
                other => {
                    self.properties.insert(other.to_string(), value.clone());
                }
            }
        }

        self.updated_at = offset;
        Ok(())
    }

    /// Parse a pipe-delimited `T` coordinate record: `lng|lat|alt|...|heading`.
    /// Only positions 0, 1, 2, and (when the record has 9 fields) 8 are
    /// consumed; empty positions preserve the prior value.
    fn apply_location(&mut self, raw: &str, coord_base: (f64, f64)) -> Result<(), FormatError> {
        let parts: Vec<&str> = raw.split('|').collect();
        if parts.len() < 3 {
            return Ok(());
        }

        if !parts[0].is_empty() {
            let lng: f64 = parts[0].parse().map_err(|_| FormatError::InvalidNumber {
                field: "longitude",
                value: parts[0].to_string(),
            })?;
            self.longitude = lng + coord_base.1;
        }

        if !parts[1].is_empty() {
            let lat: f64 = parts[1].parse().map_err(|_| FormatError::InvalidNumber {
                field: "latitude",
                value: parts[1].to_string(),
            })?;
            self.latitude = lat + coord_base.0;
        }

        if !parts[2].is_empty() {
            let alt: f64 = parts[2].parse().map_err(|_| FormatError::InvalidNumber {
                field: "altitude",
                value: parts[2].to_string(),
            })?;
            self.altitude = alt;
        }

        if parts.len() == 9 && !parts[8].is_empty() {
            let heading: f64 = parts[8].parse().map_err(|_| FormatError::InvalidNumber {
                field: "heading",
                value: parts[8].to_string(),
            })?;
            self.heading = heading;
        }

        Ok(())
    }
}

/// The whole world of one upstream connection.
#[derive(Debug, Default)]
pub struct SessionState {
    pub session_id: String,
    pub coord_base: (f64, f64),
    pub objects: HashMap<u64, TrackedObject>,
    pub offset: f64,
    pub active: bool,
}

fn find_property<'a>(properties: &'a [(String, String)], key: &str) -> Option<&'a str> {
    properties
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty the object table and mark the session inactive. Called on
    /// upstream disconnect, and at the start of `initialize`.
    pub fn reset(&mut self) {
        self.objects.clear();
        self.active = false;
    }

    /// Parse the header's global object for `sessionId`/`coordBase`, then
    /// apply the initial frame and mark the session active.
    pub fn initialize(&mut self, header: &Header) -> Result<(), InitializeError> {
        self.reset();

        let global = header
            .initial_frame
            .objects
            .iter()
            .find(|obj| obj.id == 0)
            .ok_or(InitializeError::MissingGlobalObject)?;

        self.session_id = find_property(&global.properties, "RecordingTime")
            .unwrap_or_default()
            .to_string();

        let ref_lat = find_property(&global.properties, "ReferenceLatitude");
        let ref_lng = find_property(&global.properties, "ReferenceLongitude");
        self.coord_base = match (ref_lat, ref_lng) {
            (Some(lat), Some(lng)) => {
                let lat: f64 = lat.parse().map_err(|_| FormatError::InvalidNumber {
                    field: "ReferenceLatitude",
                    value: lat.to_string(),
                })?;
                let lng: f64 = lng.parse().map_err(|_| FormatError::InvalidNumber {
                    field: "ReferenceLongitude",
                    value: lng.to_string(),
                })?;
                (lat, lng)
            }
            _ => (0.0, 0.0),
        };

        self.active = true;
        self.update(&header.initial_frame);
        Ok(())
    }

    /// Apply one frame's deltas. Parse errors on individual objects are
    /// logged and skipped; they never abort the frame.
    pub fn update(&mut self, frame: &TimeFrame) {
        self.offset = frame.offset;

        for object in &frame.objects {
            if let Some(existing) = self.objects.get_mut(&object.id) {
                if let Err(err) =
                    existing.apply(frame.offset, object.deleted, &object.properties, self.coord_base)
                {
                    log::warn!("dropping malformed update for object {:x}: {err}", object.id);
                }
            } else {
                let mut new_obj = TrackedObject::new(object.id, frame.offset);
                match new_obj.apply(frame.offset, object.deleted, &object.properties, self.coord_base) {
                    Ok(()) => {
                        self.objects.insert(object.id, new_obj);
                    }
                    Err(err) => {
                        log::warn!("dropping malformed object {:x}: {err}", object.id);
                    }
                }
            }
        }
    }
}
