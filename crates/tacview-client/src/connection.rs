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

//! Connection layer: the Tacview real-time handshake and a one-shot pull
//! API over the resulting ACMI stream.

use crc::{Crc, CRC_32_ISO_HDLC};
use log::{debug, info};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::protocol::{FrameParser, Header, ProtocolError, TimeFrame};

/// Default Tacview real-time telemetry port.
pub const DEFAULT_PORT: u16 = 42674;

/// Client identifier sent during the handshake.
const CLIENT_NAME: &str = "sneakerserver";

const XTRALIB_LINE: &str = "XtraLib.Stream.0\n";
const RTT_LINE: &str = "Tacview.RealTimeTelemetry.0\n";

/// Hash a configured password the way the Tacview real-time authentication
/// scheme expects: a CRC-32 checksum of the password's UTF-16LE bytes,
/// formatted as lowercase hex.
fn hash_password(password: &str) -> String {
    const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);
    let mut password_bytes = Vec::with_capacity(password.len() * 2);
    for unit in password.encode_utf16() {
        password_bytes.push(unit as u8);
        password_bytes.push((unit >> 8) as u8);
    }
    let checksum = CRC.checksum(&password_bytes);
    format!("{checksum:x}")
}

/// Configuration for a single upstream connection attempt.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Upstream hostname or IP.
    pub host: String,
    /// Upstream port. Defaults to [`DEFAULT_PORT`] (42674) when zero.
    pub port: u16,
    /// Optional password for servers that require authentication.
    pub password: Option<String>,
    /// Client identifier sent during the handshake.
    pub client_name: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            password: None,
            client_name: CLIENT_NAME.to_string(),
        }
    }
}

impl ConnectionConfig {
    fn resolved_port(&self) -> u16 {
        if self.port == 0 {
            DEFAULT_PORT
        } else {
            self.port
        }
    }
}

/// Errors from connecting to or reading from an upstream server.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Opens Tacview real-time connections for a fixed upstream address.
///
/// Each call to [`UpstreamClient::connect`] performs the handshake fresh and
/// returns a finite [`FrameStream`]; this type holds no connection state of
/// its own and carries no reconnect policy.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    config: ConnectionConfig,
}

impl UpstreamClient {
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// Dial the upstream, perform the handshake, and return the session
    /// header plus a lazy stream of subsequent time frames.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] on any socket failure and
    /// [`ClientError::Protocol`] if the handshake does not match the
    /// expected Tacview real-time telemetry sequence.
    pub async fn connect(&self) -> Result<(Header, FrameStream), ClientError> {
        let address = format!("{}:{}", self.config.host, self.config.resolved_port());
        info!("connecting to tacview real-time endpoint at {address}");
        let stream = TcpStream::connect(&address).await?;
        let mut reader = BufReader::new(stream);

        let mut line = String::new();
        reader.read_line(&mut line).await?;
        if line != XTRALIB_LINE {
            return Err(ClientError::Protocol(ProtocolError::BadHeaderProtocol));
        }

        line.clear();
        reader.read_line(&mut line).await?;
        if line != RTT_LINE {
            return Err(ClientError::Protocol(ProtocolError::BadHeaderVersion));
        }

        // Server hostname line, discarded.
        line.clear();
        reader.read_line(&mut line).await?;
        debug!("upstream server identified itself as {line:?}");

        let terminator = reader.read_u8().await?;
        if terminator != 0x00 {
            return Err(ClientError::Protocol(ProtocolError::BadHeaderTerminator));
        }

        reader.write_all(XTRALIB_LINE.as_bytes()).await?;
        reader.write_all(RTT_LINE.as_bytes()).await?;

        let mut client_line = format!("Client {}\n", self.config.client_name);
        if let Some(password) = &self.config.password {
            client_line.push_str(&hash_password(password));
            client_line.push('\n');
        }
        client_line.push_str("\0\n");
        reader.write_all(client_line.as_bytes()).await?;
        reader.flush().await?;

        let mut stream = FrameStream {
            reader,
            parser: FrameParser::new(),
            finished: false,
        };

        // Pull frames until the first marker boundary closes the header
        // (the global-object frame at offset 0).
        loop {
            match stream.next_frame().await? {
                Some(frame) => {
                    return Ok((
                        Header {
                            initial_frame: frame,
                        },
                        stream,
                    ));
                }
                None => {
                    if stream.finished {
                        return Err(ClientError::Io(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "stream ended before header frame completed",
                        )));
                    }
                }
            }
        }
    }
}

/// A finite, lazily-pulled sequence of [`TimeFrame`]s.
///
/// Terminates (returns `Ok(None)`) on clean EOF and surfaces the first I/O
/// error as `Err`. Reconnection is the caller's responsibility.
#[derive(Debug)]
pub struct FrameStream {
    reader: BufReader<TcpStream>,
    parser: FrameParser,
    finished: bool,
}

impl FrameStream {
    /// Pull the next completed time frame, reading and parsing lines until
    /// one closes out.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] on socket failure and
    /// [`ClientError::Protocol`] if a line cannot be parsed.
    pub async fn next_frame(&mut self) -> Result<Option<TimeFrame>, ClientError> {
        if self.finished {
            return Ok(None);
        }

        loop {
            let mut line = String::new();
            let bytes_read = self.reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                self.finished = true;
                return Ok(self.parser.finish());
            }

            if let Some(frame) = self.parser.feed(&line)? {
                return Ok(Some(frame));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_password_matches_known_crc32_of_utf16le_bytes() {
        assert_eq!(hash_password("hunter2"), "419d171a");
    }

    #[test]
    fn resolves_default_port_when_zero() {
        let config = ConnectionConfig {
            host: "example.com".to_string(),
            port: 0,
            ..Default::default()
        };
        assert_eq!(config.resolved_port(), DEFAULT_PORT);
    }

    #[test]
    fn preserves_explicit_port() {
        let config = ConnectionConfig {
            host: "example.com".to_string(),
            port: 12345,
            ..Default::default()
        };
        assert_eq!(config.resolved_port(), 12345);
    }

    #[tokio::test]
    async fn full_handshake_and_two_frames() {
        use tokio::io::AsyncReadExt as _;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(XTRALIB_LINE.as_bytes()).await.unwrap();
            socket.write_all(RTT_LINE.as_bytes()).await.unwrap();
            socket.write_all(b"dcs-server\n").await.unwrap();
            socket.write_all(&[0x00]).await.unwrap();

            // Read the client's handshake reply; we don't need to validate
            // its exact bytes for this test, just drain enough to unblock.
            let mut buf = vec![0_u8; 256];
            let _ = socket.read(&mut buf).await.unwrap();

            let body = "#0\n0,ReferenceLatitude=10,ReferenceLongitude=20,RecordingTime=S1\n1,T=5|6|100,Type=Air+FixedWing,Pilot=Viper\n#5\n1,T=|7|\n";
            socket.write_all(body.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        let client = UpstreamClient::new(ConnectionConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            ..Default::default()
        });

        let (header, mut frames) = client.connect().await.unwrap();
        assert_eq!(header.global_property("RecordingTime"), Some("S1"));
        assert_eq!(header.initial_frame.objects.len(), 2);

        let next = frames.next_frame().await.unwrap().unwrap();
        assert_eq!(next.offset, 5.0);
        assert_eq!(next.objects[0].properties[0].1, "|7|");

        assert!(frames.next_frame().await.unwrap().is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn bad_handshake_yields_protocol_error() {
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"foo\n").await.unwrap();
        });

        let client = UpstreamClient::new(ConnectionConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            ..Default::default()
        });

        let err = client.connect().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::BadHeaderProtocol)
        ));
        server.await.unwrap();
    }
}
