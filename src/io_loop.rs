//! Background socket worker.
//!
//! A single thread owns the TCP listener, the one live client socket and
//! both wire buffers. It binds to loopback, prints the readiness banner,
//! then polls: accept (a new connection preempts the old one), read (split
//! lines, parse, push inbound), write (drain outbound through a pending
//! buffer so partial writes finish in order), sleeping 1 ms when idle. The
//! worker holds no engine references; it meets the main thread only at the
//! queues and the shutdown flag.

use parking_lot::Mutex;
use serde_json::json;
use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::InputMode;
use crate::protocol::{self, LineSplitter, PROTO_VERSION};
use crate::queues::{InboundQueue, OutboundQueue};
use crate::registry::Tier;

/// Prefix of the single stdout line the launcher parses to discover the
/// bridge.
pub const BANNER_PREFIX: &str = "GDRB_READY:";

/// Idle sleep between polls.
const TICK_SLEEP: Duration = Duration::from_millis(1);

/// State shared between the I/O worker and the main thread.
pub struct IoShared {
    pub inbound: InboundQueue,
    pub outbound: OutboundQueue,
    pub shutdown: AtomicBool,
    /// Resolved port, set once after a successful bind.
    pub port: Mutex<Option<u16>>,
}

impl IoShared {
    pub fn new() -> Self {
        Self {
            inbound: InboundQueue::new(),
            outbound: OutboundQueue::new(),
            shutdown: AtomicBool::new(false),
            port: Mutex::new(None),
        }
    }
}

impl Default for IoShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Startup parameters the worker needs for binding and the banner.
#[derive(Debug, Clone)]
pub struct IoConfig {
    pub port: u16,
    pub token: String,
    pub tier: Tier,
    pub input_mode: InputMode,
}

/// Render the readiness banner line (without trailing newline). This is the
/// launcher's sole discovery mechanism, so the shape is a stable contract.
pub fn format_banner(port: u16, token: &str, tier: Tier, input_mode: InputMode) -> String {
    let payload = json!({
        "proto": PROTO_VERSION,
        "port": port,
        "token": token,
        "tier_default": tier.level(),
        "input_mode": input_mode.as_str(),
    });
    format!("{BANNER_PREFIX}{payload}")
}

/// Spawn the worker thread. It exits when the shutdown flag is set or the
/// bind fails.
pub fn spawn(shared: Arc<IoShared>, config: IoConfig) -> JoinHandle<()> {
    thread::Builder::new()
        .name("gdrb-io".to_string())
        .spawn(move || run(&shared, &config))
        .unwrap_or_else(|err| {
            // Thread spawn only fails under resource exhaustion; surface it
            // and hand back a finished handle equivalent.
            error!("failed to spawn I/O worker: {err}");
            thread::spawn(|| {})
        })
}

fn run(shared: &IoShared, config: &IoConfig) {
    let listener = match TcpListener::bind((Ipv4Addr::LOCALHOST, config.port)) {
        Ok(listener) => listener,
        Err(err) => {
            error!("bridge bind to 127.0.0.1:{} failed: {err}", config.port);
            return;
        }
    };
    if let Err(err) = listener.set_nonblocking(true) {
        error!("bridge listener setup failed: {err}");
        return;
    }
    let port = match listener.local_addr() {
        Ok(addr) => addr.port(),
        Err(err) => {
            error!("bridge listener has no local address: {err}");
            return;
        }
    };
    *shared.port.lock() = Some(port);

    println!(
        "{}",
        format_banner(port, &config.token, config.tier, config.input_mode)
    );
    debug!("bridge listening on 127.0.0.1:{port}");

    let mut client: Option<TcpStream> = None;
    let mut splitter = LineSplitter::new();
    let mut pending_write: Vec<u8> = Vec::new();

    while !shared.shutdown.load(Ordering::Relaxed) {
        // Accept, newest connection wins.
        match listener.accept() {
            Ok((stream, peer)) => {
                if client.is_some() {
                    debug!("new client {peer} preempts the active one");
                }
                if stream.set_nonblocking(true).is_ok() {
                    client = Some(stream);
                    splitter.reset();
                    pending_write.clear();
                } else {
                    warn!("could not configure client socket, rejecting {peer}");
                }
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {}
            Err(err) => warn!("accept failed: {err}"),
        }

        let mut drop_client = false;

        if let Some(stream) = client.as_mut() {
            drop_client = pump_reads(stream, &mut splitter, shared);

            for line in shared.outbound.drain() {
                pending_write.extend_from_slice(line.as_bytes());
            }
            if !drop_client {
                drop_client = pump_writes(stream, &mut pending_write);
            }
        } else {
            // No client to address: responses for a dropped connection are
            // discarded at write time.
            let _ = shared.outbound.drain();
        }

        if drop_client {
            client = None;
            splitter.reset();
            pending_write.clear();
        }

        thread::sleep(TICK_SLEEP);
    }

    debug!("bridge I/O worker shutting down");
}

/// Read everything currently available. Returns true when the connection
/// should be dropped.
fn pump_reads(stream: &mut TcpStream, splitter: &mut LineSplitter, shared: &IoShared) -> bool {
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return true,
            Ok(n) => match splitter.push(&buf[..n]) {
                Ok(lines) => {
                    for line in lines {
                        shared.inbound.push(protocol::parse_line(&line));
                    }
                }
                Err(_) => {
                    warn!("client exceeded the read-buffer cap, disconnecting");
                    return true;
                }
            },
            Err(err) if err.kind() == ErrorKind::WouldBlock => return false,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => {
                debug!("client read failed: {err}");
                return true;
            }
        }
    }
}

/// Flush as much of the pending write buffer as the socket accepts. Returns
/// true when the connection should be dropped.
fn pump_writes(stream: &mut TcpStream, pending: &mut Vec<u8>) -> bool {
    while !pending.is_empty() {
        match stream.write(pending) {
            Ok(0) => return true,
            Ok(n) => {
                pending.drain(..n);
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => return false,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => {
                debug!("client write failed: {err}");
                return true;
            }
        }
    }
    false
}
