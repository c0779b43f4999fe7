//! Connection abstraction owned by a [`Session`](crate::session::Session).
//!
//! A transport is an ordered, reliable, bidirectional byte stream. Dialing,
//! accepting, and pairing connections all happen outside this crate; the
//! session only needs to read, write, and shut the stream down.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

use crate::config::SessionConfig;

/// Byte stream a session runs over.
pub trait Transport: Read + Write {
    /// Apply socket-level settings from `config`.
    ///
    /// Streams without deadlines or Nagle's algorithm ignore the call.
    fn configure(&self, _config: &SessionConfig) -> io::Result<()> {
        Ok(())
    }

    /// Shut down both directions of the stream.
    fn shutdown(&mut self) -> io::Result<()>;
}

/// A shutdown racing the peer's own close reports `NotConnected`; the stream
/// is gone either way.
fn ignore_not_connected(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}

impl Transport for TcpStream {
    fn configure(&self, config: &SessionConfig) -> io::Result<()> {
        self.set_read_timeout(config.read_timeout())?;
        self.set_write_timeout(config.write_timeout())?;
        self.set_nodelay(config.nodelay)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        ignore_not_connected(TcpStream::shutdown(self, Shutdown::Both))
    }
}

#[cfg(unix)]
impl Transport for std::os::unix::net::UnixStream {
    fn configure(&self, config: &SessionConfig) -> io::Result<()> {
        self.set_read_timeout(config.read_timeout())?;
        self.set_write_timeout(config.write_timeout())
    }

    fn shutdown(&mut self) -> io::Result<()> {
        ignore_not_connected(std::os::unix::net::UnixStream::shutdown(
            self,
            Shutdown::Both,
        ))
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn configure(&self, config: &SessionConfig) -> io::Result<()> {
        (**self).configure(config)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        (**self).shutdown()
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn configure(&self, config: &SessionConfig) -> io::Result<()> {
        (**self).configure(config)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        (**self).shutdown()
    }
}
