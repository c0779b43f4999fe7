//! Send a file to a receiver over loopback TCP and report what arrived.
//!
//! Run with: cargo run --package ferry-protocol --example loopback_transfer -- <path>
//!
//! Set `RUST_LOG=ferry_protocol=trace` to see every frame.

use std::fs::File;
use std::net::TcpListener;
use std::path::PathBuf;
use std::thread;

use anyhow::{bail, Context, Result};
use ferry_protocol::{MessageType, Session, SessionConfig};
use sha2::{Digest, Sha256};
use tracing_subscriber::EnvFilter;

const SECRET: &str = "4-lantern-orbit";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path: PathBuf = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: loopback_transfer <path>")?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("path has no UTF-8 file name")?
        .to_string();

    let mut config = SessionConfig::default();
    config.apply_env_overrides()?;

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    let sender_config = config.clone();
    let sender = thread::spawn(move || -> Result<u64> {
        let mut file = File::open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let length = file.metadata()?.len();

        let mut session = Session::connect(addr, &sender_config)?;
        session.send_send_ready()?;
        session.wait_for_recv()?;
        session.send_secret(SECRET)?;
        session.send_file_name(&name)?;
        session.send_file_length(length)?;
        let sent = session.send(&mut file)?;
        session.close()?;
        Ok(sent)
    });

    let (stream, _) = listener.accept()?;
    let mut session = Session::attach_with(stream, &config)?;
    if session.first_byte()? != MessageType::SendReady.as_byte() {
        bail!("peer did not announce itself as a sender");
    }
    session.send_recv_ready()?;
    if session.recv_secret()? != SECRET {
        bail!("secret code mismatch");
    }
    let name = session.recv_file_name()?;
    let length = session.recv_file_length()?;

    let mut hasher = Sha256::new();
    session.recv(&mut hasher, length)?;
    session.close()?;

    let sent = sender
        .join()
        .map_err(|_| anyhow::anyhow!("sender thread panicked"))??;
    println!(
        "received {} ({} of {} bytes sent), sha256 {:x}",
        name,
        length,
        sent,
        hasher.finalize()
    );
    Ok(())
}
