//! End-to-end tests for the transfer protocol over loopback TCP.
//!
//! These tests verify complete flows work correctly:
//! - Role announcement and readiness
//! - Secret and metadata exchange
//! - Raw payload transfer, directly and through a relay
//! - Failure surfaces: tag mismatch, truncation, timeouts

use std::fs::{self, File};
use std::io::{self, Read};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use ferry_protocol::{MessageType, ProtocolError, Session, SessionConfig, SessionPhase};
use sha2::{Digest, Sha256};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Two connected sessions over loopback TCP.
fn session_pair() -> (Session, Session) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let client = Session::connect(addr, &SessionConfig::default()).unwrap();
    let (server, _) = listener.accept().unwrap();
    (client, Session::attach(server))
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

// =============================================================================
// Readiness Tests
// =============================================================================

#[test]
fn test_wait_for_recv_rejects_send_ready() {
    let (mut a, mut b) = session_pair();

    a.send_send_ready().unwrap();
    let err = b.wait_for_recv().unwrap_err();

    assert!(matches!(
        err,
        ProtocolError::UnexpectedTag {
            expected: MessageType::RecvReady,
            got: 1
        }
    ));
}

#[test]
fn test_wait_for_recv_accepts_recv_ready() {
    let (mut a, mut b) = session_pair();

    b.send_recv_ready().unwrap();
    a.wait_for_recv().unwrap();
    assert_eq!(a.phase(), SessionPhase::Started);
}

#[test]
fn test_first_byte_reports_role() {
    let (mut a, mut b) = session_pair();

    a.send_send_ready().unwrap();
    b.send_recv_ready().unwrap();

    assert_eq!(b.first_byte().unwrap(), MessageType::SendReady.as_byte());
    assert_eq!(a.first_byte().unwrap(), MessageType::RecvReady.as_byte());
}

#[test]
fn test_first_role_rejects_secret_as_opening() {
    let (a, mut b) = session_pair();

    let mut raw = a.into_inner();
    io::Write::write_all(&mut raw, &[1, MessageType::SecretCode.as_byte()]).unwrap();

    let err = b.first_role().unwrap_err();
    assert!(matches!(err, ProtocolError::NotARole(MessageType::SecretCode)));
    assert!(err.is_fatal());
}

// =============================================================================
// Full Transfer Tests
// =============================================================================

#[test]
fn test_end_to_end_transfer() {
    let (mut sender, mut receiver) = session_pair();
    let data = payload(1024);
    let source = data.clone();

    let sending = thread::spawn(move || -> ferry_protocol::Result<u64> {
        sender.send_send_ready()?;
        sender.wait_for_recv()?;
        sender.send_secret("alpha")?;
        sender.send_file_name("report.pdf")?;
        sender.send_file_length(1024)?;
        let sent = sender.send(&mut source.as_slice())?;
        sender.close()?;
        Ok(sent)
    });

    assert_eq!(receiver.first_byte().unwrap(), MessageType::SendReady.as_byte());
    receiver.send_recv_ready().unwrap();
    assert_eq!(receiver.recv_secret().unwrap(), "alpha");
    assert_eq!(receiver.recv_file_name().unwrap(), "report.pdf");
    let length = receiver.recv_file_length().unwrap();
    assert_eq!(length, 1024);

    let mut sink = Vec::new();
    receiver.recv(&mut sink, length).unwrap();

    assert_eq!(sending.join().unwrap().unwrap(), 1024);
    assert_eq!(sink, data);
    assert_eq!(receiver.phase(), SessionPhase::Transferring);
}

#[test]
fn test_file_to_file_transfer() {
    let dir = tempfile::tempdir().unwrap();
    let src_path = dir.path().join("source.bin");
    let dst_path = dir.path().join("received.bin");
    fs::write(&src_path, payload(64 * 1024 + 7)).unwrap();

    let (mut sender, mut receiver) = session_pair();
    let path = src_path.clone();
    let sending = thread::spawn(move || -> ferry_protocol::Result<()> {
        let mut file = File::open(&path)?;
        let length = file.metadata()?.len();
        sender.send_file_name("source.bin")?;
        sender.send_file_length(length)?;
        sender.send(&mut file)?;
        sender.close()
    });

    let name = receiver.recv_file_name().unwrap();
    let length = receiver.recv_file_length().unwrap();
    let mut out = File::create(&dst_path).unwrap();
    receiver.recv(&mut out, length).unwrap();
    drop(out);

    sending.join().unwrap().unwrap();
    assert_eq!(name, "source.bin");
    assert_eq!(fs::read(&dst_path).unwrap(), fs::read(&src_path).unwrap());
}

#[test]
fn test_recv_streams_into_digest() {
    let (mut sender, mut receiver) = session_pair();
    let data = payload(200 * 1024 + 3);
    let expected = Sha256::digest(&data);

    let source = data.clone();
    let sending = thread::spawn(move || -> ferry_protocol::Result<()> {
        sender.send_file_length(source.len() as u64)?;
        sender.send(&mut source.as_slice())?;
        sender.close()
    });

    let length = receiver.recv_file_length().unwrap();
    let mut hasher = Sha256::new();
    receiver.recv(&mut hasher, length).unwrap();

    sending.join().unwrap().unwrap();
    assert_eq!(hasher.finalize(), expected);
}

#[test]
fn test_transfer_through_relay() {
    init_tracing();
    let relay = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = relay.local_addr().unwrap();

    // Pairs the first two connections by their role announcements, tells the
    // sender its receiver is attached, then forwards sender bytes verbatim.
    let relaying = thread::spawn(move || -> ferry_protocol::Result<u64> {
        let mut sender = None;
        let mut receiver = None;
        for _ in 0..2 {
            let (stream, _) = relay.accept()?;
            let mut session = Session::attach(stream);
            if session.first_role()? == MessageType::SendReady {
                sender = Some(session);
            } else {
                receiver = Some(session);
            }
        }
        let (Some(mut sender), Some(receiver)) = (sender, receiver) else {
            return Err(ProtocolError::Transport("both peers announced one role".into()));
        };

        sender.send_recv_ready()?;
        let mut upstream = sender.into_inner();
        let mut downstream = receiver.into_inner();
        let forwarded = io::copy(&mut upstream, &mut downstream)?;
        downstream.shutdown(std::net::Shutdown::Write)?;
        Ok(forwarded)
    });

    let data = payload(3000);
    let source = data.clone();
    let sending = thread::spawn(move || -> ferry_protocol::Result<()> {
        let mut session = Session::connect(addr, &SessionConfig::default())?;
        session.send_send_ready()?;
        session.wait_for_recv()?;
        session.send_secret("7-crossword-banjo")?;
        session.send_file_name("photo.jpg")?;
        session.send_file_length(source.len() as u64)?;
        session.send(&mut source.as_slice())?;
        session.close()
    });

    let mut receiver = Session::connect(addr, &SessionConfig::default()).unwrap();
    receiver.send_recv_ready().unwrap();
    assert_eq!(receiver.recv_secret().unwrap(), "7-crossword-banjo");
    assert_eq!(receiver.recv_file_name().unwrap(), "photo.jpg");
    let length = receiver.recv_file_length().unwrap();
    let mut sink = Vec::with_capacity(length as usize);
    receiver.recv(&mut sink, length).unwrap();

    sending.join().unwrap().unwrap();
    relaying.join().unwrap().unwrap();
    assert_eq!(sink, data);
}

#[test]
fn test_concurrent_independent_sessions() {
    let transfers: Vec<_> = (0..4)
        .map(|n| {
            thread::spawn(move || {
                let (mut sender, mut receiver) = session_pair();
                let data = payload(512 + n * 100);
                let source = data.clone();

                let sending = thread::spawn(move || -> ferry_protocol::Result<()> {
                    sender.send_file_length(source.len() as u64)?;
                    sender.send(&mut source.as_slice())?;
                    Ok(())
                });

                let length = receiver.recv_file_length().unwrap();
                let mut sink = Vec::new();
                receiver.recv(&mut sink, length).unwrap();
                sending.join().unwrap().unwrap();
                assert_eq!(sink, data);
            })
        })
        .collect();

    for transfer in transfers {
        transfer.join().unwrap();
    }
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_recv_file_name_rejects_secret() {
    let (mut a, mut b) = session_pair();

    a.send_secret("alpha").unwrap();
    let err = b.recv_file_name().unwrap_err();

    assert!(matches!(
        err,
        ProtocolError::UnexpectedTag {
            expected: MessageType::FileName,
            got: 3
        }
    ));
    assert!(err.is_fatal());
}

#[test]
fn test_short_payload_is_short_read() {
    let (mut sender, mut receiver) = session_pair();

    sender.send_file_length(1024).unwrap();
    sender.send(&mut &payload(100)[..]).unwrap();
    sender.close().unwrap();

    let length = receiver.recv_file_length().unwrap();
    let mut sink = Vec::new();
    let err = receiver.recv(&mut sink, length).unwrap_err();

    assert!(matches!(
        err,
        ProtocolError::ShortRead {
            expected: 1024,
            actual: 100
        }
    ));
    assert_eq!(sink.len(), 100);
}

#[test]
fn test_peer_closed_mid_frame() {
    let (a, mut b) = session_pair();

    // Length byte promises eleven bytes, only three arrive.
    let mut raw = a.into_inner();
    io::Write::write_all(&mut raw, &[11, 4, b'r', b'e']).unwrap();
    drop(raw);

    let err = b.recv_file_name().unwrap_err();
    assert!(err.is_transport(), "got {:?}", err);
}

#[test]
fn test_read_timeout_from_config() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let config = SessionConfig::from_toml("read_timeout_secs = 1").unwrap();

    let mut session = Session::connect(listener.local_addr().unwrap(), &config).unwrap();
    let (_silent_peer, _) = listener.accept().unwrap();

    let err = session.wait_for_recv().unwrap_err();
    assert!(matches!(err, ProtocolError::Timeout(_)), "got {:?}", err);
}

#[test]
fn test_connect_refused() {
    init_tracing();
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let config = SessionConfig {
        connect_timeout_secs: Some(2),
        ..SessionConfig::default()
    };

    let err = Session::connect(addr, &config).unwrap_err();
    assert!(err.is_transport(), "got {:?}", err);
}

#[test]
fn test_scoped_session_releases_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (mut server, _) = listener.accept().unwrap();

    Session::scoped(client, |session| session.send_recv_ready()).unwrap();

    let mut received = Vec::new();
    server.read_to_end(&mut received).unwrap();
    assert_eq!(received, vec![1, 2]);
}

#[test]
fn test_scoped_with_applies_config() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (mut server, _) = listener.accept().unwrap();
    let config = SessionConfig::from_toml("read_timeout_secs = 1\nnodelay = false").unwrap();

    let err = Session::scoped_with(client, &config, |session| {
        assert_eq!(
            session.get_ref().read_timeout().unwrap(),
            Some(Duration::from_secs(1))
        );
        assert!(!session.get_ref().nodelay().unwrap());
        session.send_send_ready()?;
        session.wait_for_recv()
    })
    .unwrap_err();
    assert!(matches!(err, ProtocolError::Timeout(_)), "got {:?}", err);

    // Closed despite the timeout.
    let mut received = Vec::new();
    server.read_to_end(&mut received).unwrap();
    assert_eq!(received, vec![1, 1]);
}
