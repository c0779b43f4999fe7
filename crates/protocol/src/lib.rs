//! # Ferry Protocol Library
//!
//! Wire protocol for handing a single file from a sender to a receiver over
//! one persistent connection, typically paired up by a rendezvous relay.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               Session                   │  handshake + raw payload copy
//! ├─────────────────────────────────────────┤
//! │             Frame Codec                 │  1-byte length prefix, tag
//! ├─────────────────────────────────────────┤
//! │        Transport (TCP / Unix)           │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::fs::File;
//! use ferry_protocol::{Session, SessionConfig};
//!
//! # fn main() -> ferry_protocol::Result<()> {
//! let mut file = File::open("report.pdf")?;
//! let length = file.metadata()?.len();
//!
//! let mut session = Session::connect("relay.example:9000", &SessionConfig::default())?;
//! session.send_send_ready()?;
//! session.wait_for_recv()?;
//! session.send_secret("alpha")?;
//! session.send_file_name("report.pdf")?;
//! session.send_file_length(length)?;
//! session.send(&mut file)?;
//! session.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`wire`]: Frame codec for primitive values and tagged frames
//! - [`message`]: Message type tags
//! - [`session`]: Handshake and transfer over one connection
//! - [`transport`]: Connection abstraction
//! - [`config`]: Socket-level session settings
//! - [`error`]: Error types

pub mod config;
pub mod error;
pub mod message;
pub mod session;
pub mod transport;
pub mod wire;

pub use config::{ConfigError, SessionConfig};
pub use error::{ProtocolError, Result};
pub use message::MessageType;
pub use session::{Session, SessionPhase};
pub use transport::Transport;
pub use wire::{
    read_frame, write_frame, Decoder, Encoder, Frame, FrameDecoder, FrameEncoder,
    BYTE_FRAME_LEN, INT64_FRAME_LEN, MAX_FRAME_LEN, MAX_PAYLOAD_SIZE,
};
