//! The authenticated console channel and the connection state around it.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use rcon_proto::{frame_length, Frame, Packet, PacketType, ProtoError};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::ErrorKind;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("connection closed by server")]
    Closed,
    #[error("no response within {0:?}")]
    TimedOut(Duration),
    #[error("password rejected by {0}")]
    AuthRejected(String),
    #[error("response id {got} does not match request id {expected}")]
    Desync { expected: i32, got: i32 },
    #[error("packet error: {0}")]
    Proto(#[from] ProtoError),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Connect { .. }
            | TransportError::Io(_)
            | TransportError::Closed
            | TransportError::Desync { .. } => ErrorKind::Connection,
            TransportError::TimedOut(_) => ErrorKind::ServerBusyOrTimeout,
            TransportError::AuthRejected(_) => ErrorKind::Authentication,
            TransportError::Proto(ProtoError::BodyTooLong { .. }) => ErrorKind::CommandRejected,
            TransportError::Proto(_) => ErrorKind::Protocol,
        }
    }

    /// Whether the underlying socket can no longer be trusted.
    fn poisons_connection(&self) -> bool {
        !matches!(
            self,
            TransportError::Proto(ProtoError::BodyTooLong { .. })
        )
    }
}

/// One request/response console channel. Implementations are driven by a
/// single caller at a time; [`Connection`] owns the reconnect policy.
#[async_trait]
pub trait Transport: Send {
    /// Opens the channel and authenticates.
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Sends one command and returns the full response text.
    async fn request(&mut self, command: &str) -> Result<String, TransportError>;

    async fn close(&mut self);
}

/// RCON over TCP.
///
/// Each command is followed by an empty `RESPONSE_VALUE` packet under its
/// own id. Servers answer packets in order, so the reply to that sentinel
/// marks the end of the command's fragments, whatever their sizes.
pub struct RconTransport {
    address: String,
    password: String,
    stream: Option<TcpStream>,
    next_id: i32,
    /// Id of the previous sentinel. Some servers answer a sentinel with more
    /// than one packet; the extras are skipped on the next read.
    last_sentinel: Option<i32>,
}

impl RconTransport {
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            stream: None,
            next_id: 1,
            last_sentinel: None,
        }
    }

    fn allocate_id(&mut self) -> i32 {
        let id = self.next_id;
        // Stay positive: -1 is the auth rejection marker.
        self.next_id = if self.next_id == i32::MAX { 1 } else { self.next_id + 1 };
        id
    }
}

/// Reads the bytes of one frame, length prefix excluded.
async fn read_frame(stream: &mut TcpStream) -> Result<Vec<u8>, TransportError> {
    let mut len_buf = [0u8; 4];
    if let Err(err) = stream.read_exact(&mut len_buf).await {
        return Err(eof_as_closed(err));
    }
    let len = frame_length(len_buf)?;
    let mut frame = vec![0u8; len];
    if let Err(err) = stream.read_exact(&mut frame).await {
        return Err(eof_as_closed(err));
    }
    Ok(frame)
}

async fn read_packet(stream: &mut TcpStream) -> Result<Packet, TransportError> {
    let frame = read_frame(stream).await?;
    Ok(Packet::decode_frame(&frame)?)
}

fn eof_as_closed(err: io::Error) -> TransportError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        TransportError::Closed
    } else {
        TransportError::Io(err)
    }
}

#[async_trait]
impl Transport for RconTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        let mut stream =
            TcpStream::connect(&self.address)
                .await
                .map_err(|source| TransportError::Connect {
                    address: self.address.clone(),
                    source,
                })?;
        if let Err(err) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", err);
        }

        let id = self.allocate_id();
        stream
            .write_all(&Packet::auth(id, &self.password).encode())
            .await?;
        loop {
            let packet = read_packet(&mut stream).await?;
            if packet.is_auth_rejection() {
                return Err(TransportError::AuthRejected(self.address.clone()));
            }
            // Some servers send an empty value packet ahead of the auth answer.
            if packet.kind == PacketType::AUTH_RESPONSE {
                if packet.id != id {
                    return Err(TransportError::Desync {
                        expected: id,
                        got: packet.id,
                    });
                }
                break;
            }
        }
        info!(address = %self.address, "rcon.authenticated");
        self.stream = Some(stream);
        Ok(())
    }

    async fn request(&mut self, command: &str) -> Result<String, TransportError> {
        let id = self.allocate_id();
        let sentinel = self.allocate_id();
        let mut outgoing = Packet::command(id, command)?.encode();
        outgoing.extend_from_slice(&Packet::response(sentinel, "").encode());
        let stale = self.last_sentinel;
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        stream.write_all(&outgoing).await?;

        let mut body = Vec::new();
        loop {
            let bytes = read_frame(stream).await?;
            let reply = Frame::parse(&bytes)?;
            if reply.id == id {
                body.extend_from_slice(reply.body);
            } else if reply.id == sentinel {
                break;
            } else if Some(reply.id) != stale {
                return Err(TransportError::Desync {
                    expected: id,
                    got: reply.id,
                });
            }
        }
        self.last_sentinel = Some(sentinel);
        String::from_utf8(body).map_err(|_| TransportError::Proto(ProtoError::InvalidUtf8))
    }

    async fn close(&mut self) {
        self.last_sentinel = None;
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Ready,
    /// Sticky: the password was refused and will not be tried again.
    AuthRejected(String),
}

/// Owns one transport and reconnects it lazily: a dropped channel is only
/// reopened when the next command needs it.
pub struct Connection<T: Transport> {
    transport: T,
    state: ConnectionState,
    opens: u64,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            opens: 0,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Number of times the channel has been (re)opened successfully.
    pub fn opens(&self) -> u64 {
        self.opens
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn ensure_ready(&mut self, timeout: Duration) -> Result<(), TransportError> {
        match &self.state {
            ConnectionState::Ready => return Ok(()),
            ConnectionState::AuthRejected(address) => {
                return Err(TransportError::AuthRejected(address.clone()))
            }
            ConnectionState::Disconnected => {}
        }
        let opened = match tokio::time::timeout(timeout, self.transport.open()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::TimedOut(timeout)),
        };
        match opened {
            Ok(()) => {
                self.opens += 1;
                if self.opens > 1 {
                    info!(opens = self.opens, "rcon.reconnected");
                }
                self.state = ConnectionState::Ready;
                Ok(())
            }
            Err(TransportError::AuthRejected(address)) => {
                warn!(%address, "rcon.auth_rejected");
                self.state = ConnectionState::AuthRejected(address.clone());
                Err(TransportError::AuthRejected(address))
            }
            Err(err) => {
                self.transport.close().await;
                Err(err)
            }
        }
    }

    /// Sends `command`, connecting first if needed. Any failure that leaves the
    /// stream in an unknown state drops it so the next call starts clean.
    pub async fn send(&mut self, command: &str, timeout: Duration) -> Result<String, TransportError> {
        self.ensure_ready(timeout).await?;
        let result = match tokio::time::timeout(timeout, self.transport.request(command)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::TimedOut(timeout)),
        };
        if let Err(err) = &result {
            if err.poisons_connection() {
                debug!(error = %err, "rcon.connection_dropped");
                self.drop_channel().await;
            }
        }
        result
    }

    async fn drop_channel(&mut self) {
        self.transport.close().await;
        if self.state == ConnectionState::Ready {
            self.state = ConnectionState::Disconnected;
        }
    }

    /// Explicit teardown. A later `send` reconnects.
    pub async fn close(&mut self) {
        self.drop_channel().await;
    }
}
