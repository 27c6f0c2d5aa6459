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

//! ACMI text-stream parsing.
//!
//! This module turns the line-oriented Tacview real-time ACMI body into
//! [`TimeFrame`] values. A frame begins with a line of the form `#<offset>`
//! and runs until the next such line; object lines within it are either
//! upserts (`<hex-id>,<key>=<value>,...`) or deletions (`-<hex-id>`).

use thiserror::Error;

/// Errors that can occur while parsing the ACMI body.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("bad header protocol")]
    BadHeaderProtocol,

    #[error("bad header version")]
    BadHeaderVersion,

    #[error("bad or missing end of header")]
    BadHeaderTerminator,

    #[error("invalid frame offset: {0:?}")]
    BadFrameOffset(String),

    #[error("invalid object id: {0:?}")]
    BadObjectId(String),
}

/// A single object upsert or deletion within a [`TimeFrame`].
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectUpdate {
    /// Object id, decoded from the wire's hexadecimal representation.
    pub id: u64,
    /// True if this line was a deletion (`-<hex-id>`).
    pub deleted: bool,
    /// Ordered `key=value` properties carried by an upsert line. Empty for
    /// deletions.
    pub properties: Vec<(String, String)>,
}

/// One tick's delta: a frame offset plus every object upsert/deletion that
/// arrived between the previous frame marker and this one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeFrame {
    /// Seconds since session start, as carried on the wire.
    pub offset: f64,
    pub objects: Vec<ObjectUpdate>,
}

/// The first frame of a session, carrying the global object (id 0) with
/// world constants such as `ReferenceLatitude`/`ReferenceLongitude` and
/// `RecordingTime`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Header {
    pub initial_frame: TimeFrame,
}

impl Header {
    /// Look up a property on the global object (id 0) of the initial frame.
    #[must_use]
    pub fn global_property(&self, key: &str) -> Option<&str> {
        self.initial_frame
            .objects
            .iter()
            .find(|obj| obj.id == 0)
            .and_then(|obj| {
                obj.properties
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.as_str())
            })
    }
}

fn parse_hex_id(raw: &str) -> Result<u64, ProtocolError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ProtocolError::BadObjectId(raw.to_string()));
    }
    u64::from_str_radix(raw, 16).map_err(|_| ProtocolError::BadObjectId(raw.to_string()))
}

/// Incremental parser that accumulates ACMI lines into [`TimeFrame`]s.
///
/// Feed it lines one at a time via [`FrameParser::feed`]; it returns the
/// *previous* frame once a new `#<offset>` marker starts the next one. Call
/// [`FrameParser::finish`] at end-of-stream to flush any in-progress frame.
#[derive(Debug, Default)]
pub struct FrameParser {
    current: Option<TimeFrame>,
}

impl FrameParser {
    #[must_use]
    pub fn new() -> Self {
        Self { current: None }
    }

    /// Feed a single line (without its trailing newline) into the parser.
    ///
    /// Returns `Ok(Some(frame))` when this line closed out a previously
    /// in-progress frame (a new `#<offset>` marker), `Ok(None)` otherwise.
    /// Lines preceding the first frame marker are preamble and are ignored.
    pub fn feed(&mut self, line: &str) -> Result<Option<TimeFrame>, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Ok(None);
        }

        if let Some(rest) = line.strip_prefix('#') {
            let offset: f64 = rest
                .trim()
                .parse()
                .map_err(|_| ProtocolError::BadFrameOffset(rest.to_string()))?;
            let finished = self.current.take();
            self.current = Some(TimeFrame {
                offset,
                objects: Vec::new(),
            });
            return Ok(finished);
        }

        let Some(frame) = self.current.as_mut() else {
            // Preamble (e.g. FileType=/FileVersion= lines) before the first
            // frame marker. Parsing of the outer ACMI container is out of
            // scope; we only need the frame stream.
            return Ok(None);
        };

        if let Some(hex) = line.strip_prefix('-') {
            let id = parse_hex_id(hex)?;
            frame.objects.push(ObjectUpdate {
                id,
                deleted: true,
                properties: Vec::new(),
            });
            return Ok(None);
        }

        let mut split = line.splitn(2, ',');
        let id_field = split.next().unwrap_or("");
        if id_field.is_empty() {
            return Ok(None);
        }
        let id = parse_hex_id(id_field)?;
        let rest = split.next().unwrap_or("");
        let properties = rest
            .split(',')
            .filter(|field| !field.is_empty())
            .map(|kv| {
                let mut parts = kv.splitn(2, '=');
                let key = parts.next().unwrap_or("").to_string();
                let value = parts.next().unwrap_or("").to_string();
                (key, value)
            })
            .collect();

        frame.objects.push(ObjectUpdate {
            id,
            deleted: false,
            properties,
        });
        Ok(None)
    }

    /// Flush any frame that was still accumulating at end-of-stream.
    pub fn finish(&mut self) -> Option<TimeFrame> {
        self.current.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_preamble_before_first_marker() {
        let mut parser = FrameParser::new();
        assert_eq!(parser.feed("FileType=text/acmi/tacview").unwrap(), None);
        assert_eq!(parser.feed("FileVersion=2.1").unwrap(), None);
        assert_eq!(parser.feed("#0").unwrap(), None);
    }

    #[test]
    fn flushes_previous_frame_on_next_marker() {
        let mut parser = FrameParser::new();
        parser.feed("#0").unwrap();
        parser
            .feed("0,ReferenceLatitude=10,ReferenceLongitude=20")
            .unwrap();
        parser
            .feed("1,T=5|6|100,Type=Air+FixedWing,Pilot=Viper")
            .unwrap();

        let flushed = parser.feed("#5").unwrap().expect("frame 0 should flush");
        assert_eq!(flushed.offset, 0.0);
        assert_eq!(flushed.objects.len(), 2);
        assert_eq!(flushed.objects[1].id, 1);
        assert_eq!(
            flushed.objects[1].properties,
            vec![
                ("T".to_string(), "5|6|100".to_string()),
                ("Type".to_string(), "Air+FixedWing".to_string()),
                ("Pilot".to_string(), "Viper".to_string()),
            ]
        );
    }

    #[test]
    fn parses_deletion_lines() {
        let mut parser = FrameParser::new();
        parser.feed("#10").unwrap();
        parser.feed("-1").unwrap();
        let flushed = parser.feed("#20").unwrap().unwrap();
        assert_eq!(flushed.objects, vec![ObjectUpdate {
            id: 1,
            deleted: true,
            properties: vec![],
        }]);
    }

    #[test]
    fn finish_flushes_in_progress_frame() {
        let mut parser = FrameParser::new();
        parser.feed("#1.5").unwrap();
        parser.feed("2,Type=Ground+Tank").unwrap();
        let flushed = parser.finish().unwrap();
        assert_eq!(flushed.offset, 1.5);
        assert_eq!(flushed.objects.len(), 1);
    }

    #[test]
    fn rejects_bad_frame_offset() {
        let mut parser = FrameParser::new();
        assert!(matches!(
            parser.feed("#not-a-number"),
            Err(ProtocolError::BadFrameOffset(_))
        ));
    }

    #[test]
    fn rejects_bad_object_id() {
        let mut parser = FrameParser::new();
        parser.feed("#0").unwrap();
        assert!(matches!(
            parser.feed("-zzz"),
            Err(ProtocolError::BadObjectId(_))
        ));
    }

    #[test]
    fn header_global_property_lookup() {
        let mut parser = FrameParser::new();
        parser.feed("#0").unwrap();
        parser
            .feed("0,ReferenceLatitude=10,RecordingTime=S1")
            .unwrap();
        let frame = parser.finish().unwrap();
        let header = Header {
            initial_frame: frame,
        };
        assert_eq!(header.global_property("RecordingTime"), Some("S1"));
        assert_eq!(header.global_property("ReferenceLongitude"), None);
    }
}
