//! Message transport over a framed byte stream.

use crate::config::SessionConfig;
use crate::error::{from_io, SyncError, SyncResult};
use dirsync_protocol::{
    decode_frame, encode_frame, frame_length, max_frame_len, WireMessage, FRAME_HEADER_LEN,
};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, trace};

/// Sends and receives whole protocol messages, one at a time.
///
/// Both calls block. A session carries one request/response exchange at a
/// time; parallel transfers use separate sessions.
pub trait MessageTransport: Send {
    /// Sends one message.
    fn send_message(&mut self, message: &WireMessage) -> SyncResult<()>;

    /// Receives the next message.
    fn receive_message(&mut self) -> SyncResult<WireMessage>;

    /// Receives the next message, turning an `Error` message into
    /// [`SyncError::Remote`].
    fn receive_reply(&mut self) -> SyncResult<WireMessage> {
        match self.receive_message()? {
            WireMessage::Error(error) => Err(SyncError::Remote {
                code: error.code,
                message: error.message,
            }),
            message => Ok(message),
        }
    }
}

/// A blocking framed session over a byte stream.
///
/// `KeepAlive` frames are consumed silently on receive.
#[derive(Debug)]
pub struct TcpSession<S = TcpStream> {
    stream: S,
    max_frame_len: usize,
}

impl TcpSession<TcpStream> {
    /// Connects to `addr` and applies the configured timeouts.
    pub fn connect(addr: impl ToSocketAddrs, config: &SessionConfig) -> SyncResult<Self> {
        let stream = TcpStream::connect(addr).map_err(from_io)?;
        Self::from_tcp(stream, config)
    }

    /// Wraps an accepted or connected socket.
    pub fn from_tcp(stream: TcpStream, config: &SessionConfig) -> SyncResult<Self> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        if let Ok(peer) = stream.peer_addr() {
            debug!(peer = %peer, "session opened");
        }
        Ok(Self::new(stream, config))
    }
}

impl<S: Read + Write> TcpSession<S> {
    /// Wraps any byte stream.
    pub fn new(stream: S, config: &SessionConfig) -> Self {
        Self {
            stream,
            max_frame_len: config.max_frame_len,
        }
    }

    /// Adjusts the receive limit after negotiation.
    pub fn set_max_packet_size(&mut self, max_packet_size: usize) {
        self.max_frame_len = max_frame_len(max_packet_size);
    }

    /// Returns the current receive limit.
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Returns the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Consumes the session, returning the stream.
    ///
    /// # Example
    ///
    /// ```
    /// use dirsync_engine::{MessageTransport, TcpSession};
    /// use dirsync_protocol::WireMessage;
    /// use std::io::Cursor;
    ///
    /// let mut session = TcpSession::new(Cursor::new(Vec::new()), &Default::default());
    /// session.send_message(&WireMessage::KeepAlive)?;
    /// let written = session.into_inner().into_inner();
    /// assert!(written.ends_with(b"KA"));
    /// # Ok::<(), dirsync_engine::SyncError>(())
    /// ```
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Reads a frame header. `None` means the stream ended cleanly.
    fn read_header(&mut self) -> SyncResult<Option<[u8; FRAME_HEADER_LEN]>> {
        let mut header = [0u8; FRAME_HEADER_LEN];
        let mut filled = 0;
        while filled < header.len() {
            match self.stream.read(&mut header[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(SyncError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "stream ended inside a frame header",
                    )))
                }
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(from_io(err)),
            }
        }
        Ok(Some(header))
    }

    fn read_frame(&mut self) -> SyncResult<WireMessage> {
        let header = self.read_header()?.ok_or(SyncError::ConnectionClosed)?;
        let body_len = frame_length(header, self.max_frame_len)?;
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body_len);
        frame.extend_from_slice(&header);
        frame.resize(FRAME_HEADER_LEN + body_len, 0);
        self.stream
            .read_exact(&mut frame[FRAME_HEADER_LEN..])
            .map_err(from_io)?;
        Ok(decode_frame(&frame, self.max_frame_len)?)
    }
}

impl<S: Read + Write + Send> MessageTransport for TcpSession<S> {
    fn send_message(&mut self, message: &WireMessage) -> SyncResult<()> {
        let frame = encode_frame(message)?;
        trace!(kind = %message.message_type(), len = frame.len(), "send");
        self.stream.write_all(&frame).map_err(from_io)?;
        self.stream.flush().map_err(from_io)
    }

    fn receive_message(&mut self) -> SyncResult<WireMessage> {
        loop {
            let message = self.read_frame()?;
            trace!(kind = %message.message_type(), "receive");
            if !matches!(message, WireMessage::KeepAlive) {
                return Ok(message);
            }
        }
    }
}

/// A scripted transport for testing.
///
/// Messages queued with [`MockTransport::push_incoming`] are returned by
/// `receive_message` in order; everything sent is recorded.
#[derive(Debug)]
pub struct MockTransport {
    incoming: VecDeque<WireMessage>,
    sent: Vec<WireMessage>,
    connected: bool,
}

impl MockTransport {
    /// Creates a connected mock with an empty script.
    pub fn new() -> Self {
        Self {
            incoming: VecDeque::new(),
            sent: Vec::new(),
            connected: true,
        }
    }

    /// Creates a mock that will return `messages` in order.
    pub fn with_script(messages: impl IntoIterator<Item = WireMessage>) -> Self {
        let mut mock = Self::new();
        mock.incoming.extend(messages);
        mock
    }

    /// Queues one message for `receive_message`.
    pub fn push_incoming(&mut self, message: impl Into<WireMessage>) {
        self.incoming.push_back(message.into());
    }

    /// Messages sent so far.
    pub fn sent(&self) -> &[WireMessage] {
        &self.sent
    }

    /// Number of scripted messages not yet received.
    pub fn pending(&self) -> usize {
        self.incoming.len()
    }

    /// Sets the connected state.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageTransport for MockTransport {
    fn send_message(&mut self, message: &WireMessage) -> SyncResult<()> {
        if !self.connected {
            return Err(SyncError::ConnectionClosed);
        }
        self.sent.push(message.clone());
        Ok(())
    }

    fn receive_message(&mut self) -> SyncResult<WireMessage> {
        if !self.connected {
            return Err(SyncError::ConnectionClosed);
        }
        self.incoming.pop_front().ok_or(SyncError::ConnectionClosed)
    }
}
