//! File transfer session over a single connection.
//!
//! A session sequences tagged frames into the transfer handshake and then
//! hands the connection over to an unframed copy of the file payload.
//!
//! ## Handshake
//!
//! ```text
//! sender                         receiver
//!   -- SendReady -->    (rendezvous)   <-- RecvReady --
//!   wait_for_recv   <------------------- RecvReady
//!   SecretCode      ------------------->  recv_secret
//!   FileName        ------------------->  recv_file_name
//!   FileLength      ------------------->  recv_file_length
//!   raw bytes       ------------------->  recv(sink, length)
//! ```
//!
//! Every step is a blocking call that either completes one frame or fails.
//! Nothing is retried, and a failed session should be closed: after a bad
//! frame there is no way to find the next frame boundary.
//!
//! The session records the phase it has reached but does not refuse calls
//! made out of order. Sequencing is the caller's job.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use tracing::{debug, trace, warn};

use crate::config::SessionConfig;
use crate::error::{ProtocolError, Result};
use crate::message::MessageType;
use crate::transport::Transport;
use crate::wire::{read_frame, write_frame, Frame, INT64_FRAME_LEN};

/// How far a session has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionPhase {
    /// Connected, no role announced or received yet.
    Initial,
    /// Role or handshake frames have been exchanged.
    Started,
    /// The raw file payload is being copied.
    Transferring,
}

/// A file transfer session that exclusively owns one connection.
#[derive(Debug)]
pub struct Session<T: Transport = TcpStream> {
    conn: T,
    phase: SessionPhase,
}

impl Session<TcpStream> {
    /// Dial `addr` over TCP and start a session on the new connection.
    ///
    /// Each resolved address is tried in turn; the last error is returned if
    /// none of them accept.
    pub fn connect<A: ToSocketAddrs>(addr: A, config: &SessionConfig) -> Result<Self> {
        config.validate()?;

        let stream = match config.connect_timeout() {
            None => TcpStream::connect(addr)?,
            Some(timeout) => {
                let mut last_err = None;
                let mut connected = None;
                for candidate in addr.to_socket_addrs()? {
                    match TcpStream::connect_timeout(&candidate, timeout) {
                        Ok(stream) => {
                            connected = Some(stream);
                            break;
                        }
                        Err(e) => {
                            debug!(addr = %candidate, error = %e, "connect attempt failed");
                            last_err = Some(e);
                        }
                    }
                }
                match (connected, last_err) {
                    (Some(stream), _) => stream,
                    (None, Some(e)) => return Err(e.into()),
                    (None, None) => {
                        return Err(ProtocolError::Transport(
                            "address resolved to no socket addresses".to_string(),
                        ))
                    }
                }
            }
        };

        if let Ok(peer) = stream.peer_addr() {
            debug!(%peer, "session connected");
        }
        Self::attach_with(stream, config)
    }
}

impl<T: Transport> Session<T> {
    /// Start a session on an existing connection, leaving its settings as-is.
    pub fn attach(conn: T) -> Self {
        Self {
            conn,
            phase: SessionPhase::Initial,
        }
    }

    /// Start a session on an existing connection after applying `config`.
    pub fn attach_with(conn: T, config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        conn.configure(config)?;
        Ok(Self::attach(conn))
    }

    /// Run `f` on a session over `conn` and close the connection afterwards,
    /// whether `f` succeeded or not.
    ///
    /// An error from `f` takes precedence over an error from closing.
    pub fn scoped<F, R>(conn: T, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        Self::attach(conn).run_and_close(f)
    }

    /// [`scoped`](Self::scoped), applying `config` to the connection first.
    ///
    /// An invalid `config` is reported before `f` runs, and the connection is
    /// dropped without a shutdown.
    pub fn scoped_with<F, R>(conn: T, config: &SessionConfig, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        Self::attach_with(conn, config)?.run_and_close(f)
    }

    fn run_and_close<F, R>(mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        let outcome = f(&mut self);
        let closed = self.close();
        match outcome {
            Ok(value) => closed.map(|()| value),
            Err(e) => {
                if let Err(close_err) = closed {
                    warn!(error = %close_err, "failed to close session after error");
                }
                Err(e)
            }
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Get a reference to the underlying connection.
    pub fn get_ref(&self) -> &T {
        &self.conn
    }

    /// Get a mutable reference to the underlying connection.
    ///
    /// Reading or writing through it bypasses framing and will desynchronize
    /// the session unless the peer expects exactly those bytes.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.conn
    }

    /// Unwrap the underlying connection without closing it.
    pub fn into_inner(self) -> T {
        self.conn
    }

    /// Read the first frame of a fresh connection and return its single byte.
    ///
    /// Peers open with a role announcement, so a relay can call this to learn
    /// which side connected before any typed exchange. The byte is returned raw
    /// for the caller to interpret.
    pub fn first_byte(&mut self) -> Result<u8> {
        let frame = self.next_frame()?;
        if frame.length_byte() != 1 {
            warn!(length = frame.length_byte(), "first frame is not a single byte");
            return Err(ProtocolError::MalformedFrame {
                context: "first frame must carry exactly one byte",
                length: frame.length_byte(),
            });
        }
        self.advance(SessionPhase::Started);
        Ok(frame.tag())
    }

    /// Read the opening frame and classify it as a role announcement.
    ///
    /// Strict form of [`first_byte`](Self::first_byte) for relays: the byte
    /// must be a known tag, and that tag must be `SendReady` or `RecvReady`.
    pub fn first_role(&mut self) -> Result<MessageType> {
        let role = MessageType::try_from(self.first_byte()?)?;
        if !role.is_role() {
            warn!(tag = %role, "opening frame is not a role announcement");
            return Err(ProtocolError::NotARole(role));
        }
        debug!(role = %role, "peer announced role");
        Ok(role)
    }

    /// Announce this peer as the sender.
    pub fn send_send_ready(&mut self) -> Result<()> {
        self.send_signal(MessageType::SendReady)
    }

    /// Announce this peer as the receiver, ready for data.
    pub fn send_recv_ready(&mut self) -> Result<()> {
        self.send_signal(MessageType::RecvReady)
    }

    /// Block until the receiver's ready announcement arrives.
    pub fn wait_for_recv(&mut self) -> Result<()> {
        let frame = self.next_frame()?;
        expect_tag(&frame, MessageType::RecvReady)?;
        if !frame.payload().is_empty() {
            return Err(ProtocolError::MalformedFrame {
                context: "recv-ready carries no payload",
                length: frame.length_byte(),
            });
        }
        self.advance(SessionPhase::Started);
        debug!("receiver is ready");
        Ok(())
    }

    /// Send the shared secret code pairing the two peers.
    pub fn send_secret(&mut self, code: &str) -> Result<()> {
        self.send_string(MessageType::SecretCode, code)
    }

    /// Receive the shared secret code. Checking it is up to the caller.
    pub fn recv_secret(&mut self) -> Result<String> {
        self.recv_string(MessageType::SecretCode)
    }

    /// Send the name of the file about to be transferred.
    pub fn send_file_name(&mut self, name: &str) -> Result<()> {
        self.send_string(MessageType::FileName, name)
    }

    /// Receive the name of the file about to be transferred.
    pub fn recv_file_name(&mut self) -> Result<String> {
        self.recv_string(MessageType::FileName)
    }

    /// Send the file size in bytes as a fixed 8-byte big-endian payload.
    pub fn send_file_length(&mut self, length: u64) -> Result<()> {
        let frame = Frame::new(MessageType::FileLength, length.to_be_bytes().to_vec())?;
        self.write(&frame)?;
        self.advance(SessionPhase::Started);
        Ok(())
    }

    /// Receive the file size in bytes.
    pub fn recv_file_length(&mut self) -> Result<u64> {
        let frame = self.next_frame()?;
        expect_tag(&frame, MessageType::FileLength)?;
        if frame.length_byte() != INT64_FRAME_LEN {
            return Err(ProtocolError::MalformedFrame {
                context: "file-length payload must be 8 bytes",
                length: frame.length_byte(),
            });
        }

        let mut value = [0u8; 8];
        value.copy_from_slice(frame.payload());
        self.advance(SessionPhase::Started);
        Ok(u64::from_be_bytes(value))
    }

    /// Copy everything from `source` onto the connection, unframed.
    ///
    /// Returns the number of bytes sent. The receiver must already know how
    /// many bytes to expect from the file-length exchange.
    pub fn send<R: Read + ?Sized>(&mut self, source: &mut R) -> Result<u64> {
        self.advance(SessionPhase::Transferring);
        let sent = io::copy(source, &mut self.conn)?;
        self.conn.flush()?;
        debug!(bytes = sent, "payload sent");
        Ok(sent)
    }

    /// Copy exactly `length` bytes from the connection into `sink`.
    ///
    /// Fails with [`ProtocolError::ShortRead`] if the connection ends first.
    pub fn recv<W: Write + ?Sized>(&mut self, sink: &mut W, length: u64) -> Result<()> {
        self.advance(SessionPhase::Transferring);
        let received = io::copy(&mut (&mut self.conn).take(length), sink)?;
        if received < length {
            warn!(expected = length, actual = received, "payload cut short");
            return Err(ProtocolError::ShortRead {
                expected: length,
                actual: received,
            });
        }
        debug!(bytes = received, "payload received");
        Ok(())
    }

    /// Shut the connection down and release it.
    ///
    /// The session is consumed, so a second close cannot be expressed.
    pub fn close(mut self) -> Result<()> {
        self.conn.shutdown()?;
        debug!(phase = ?self.phase, "session closed");
        Ok(())
    }

    fn send_signal(&mut self, ty: MessageType) -> Result<()> {
        self.write(&Frame::signal(ty))?;
        self.advance(SessionPhase::Started);
        Ok(())
    }

    fn send_string(&mut self, ty: MessageType, value: &str) -> Result<()> {
        let frame = Frame::new(ty, value.as_bytes().to_vec())?;
        self.write(&frame)?;
        self.advance(SessionPhase::Started);
        Ok(())
    }

    fn recv_string(&mut self, ty: MessageType) -> Result<String> {
        let frame = self.next_frame()?;
        expect_tag(&frame, ty)?;
        let length = frame.length_byte();
        let value = String::from_utf8(frame.into_payload()).map_err(|_| {
            ProtocolError::MalformedFrame {
                context: "string payload is not valid UTF-8",
                length,
            }
        })?;
        self.advance(SessionPhase::Started);
        Ok(value)
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        write_frame(&mut self.conn, frame)?;
        self.conn.flush()?;
        trace!(tag = frame.tag(), length = frame.length_byte(), "frame sent");
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let frame = read_frame(&mut self.conn)?;
        trace!(tag = frame.tag(), length = frame.length_byte(), "frame received");
        Ok(frame)
    }

    fn advance(&mut self, phase: SessionPhase) {
        if phase > self.phase {
            debug!(from = ?self.phase, to = ?phase, "session phase changed");
            self.phase = phase;
        }
    }
}

fn expect_tag(frame: &Frame, expected: MessageType) -> Result<()> {
    if frame.tag() != expected.as_byte() {
        warn!(expected = %expected, got = frame.tag(), "unexpected frame tag");
        return Err(ProtocolError::UnexpectedTag {
            expected,
            got: frame.tag(),
        });
    }
    Ok(())
}
