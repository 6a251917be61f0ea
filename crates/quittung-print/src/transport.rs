// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer transports: how rendered receipt bytes reach the hardware.
//
//   tcp://host[:port]   raw TCP (JetDirect, default port 9100)
//   printer:NAME        the OS spooler, via `lp -d NAME -o raw`
//   anything else       a character device such as /dev/usb/lp0
//
// Every operation runs under a timeout so a hung printer cannot stall the
// queue's drain loop indefinitely.

use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, info};

use quittung_core::error::{QuittungError, Result};
use quittung_core::types::PrinterStatus;

/// Default raw TCP port (HP JetDirect).
pub const RAW_PORT: u16 = 9100;

/// Bytes written per chunk, for progress logging.
const CHUNK_SIZE: usize = 8192;

/// Where the printer lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrinterInterface {
    Tcp { host: String, port: u16 },
    Spooler { name: String },
    Device { path: PathBuf },
}

impl PrinterInterface {
    /// Parse a `PRINTER_INTERFACE` value.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if let Some(name) = raw.strip_prefix("printer:") {
            if name.trim().is_empty() {
                return Err(interface_err(raw, "missing printer name"));
            }
            return Ok(Self::Spooler {
                name: name.trim().to_string(),
            });
        }
        if let Some(addr) = raw.strip_prefix("tcp://") {
            let (host, port) = split_host_port(addr.trim_end_matches('/'))
                .map_err(|reason| interface_err(raw, reason))?;
            return Ok(Self::Tcp { host, port });
        }
        if raw.is_empty() {
            return Err(interface_err(raw, "empty interface"));
        }
        Ok(Self::Device {
            path: PathBuf::from(raw),
        })
    }

    /// Send a complete document, bounded by `timeout`.
    pub async fn send(&self, bytes: &[u8], timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.send_inner(bytes))
            .await
            .map_err(|_| {
                QuittungError::Transport(format!(
                    "{self} did not accept the job within {}s",
                    timeout.as_secs()
                ))
            })?
    }

    async fn send_inner(&self, bytes: &[u8]) -> Result<()> {
        match self {
            Self::Tcp { host, port } => send_raw(host, *port, bytes).await,
            Self::Spooler { name } => send_spooler(name, bytes).await,
            Self::Device { path } => send_device(path, bytes).await,
        }
    }

    /// Check whether the printer is reachable.  Spooler queues are not
    /// probed; the OS owns their connectivity.
    pub async fn probe(&self, timeout: Duration) -> PrinterStatus {
        match self {
            Self::Spooler { .. } => PrinterStatus::Spooler,
            Self::Tcp { host, port } => {
                let addr = socket_target(host, *port);
                match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
                    Ok(Ok(_)) => PrinterStatus::Connected,
                    Ok(Err(e)) => {
                        debug!(addr = %addr, error = %e, "printer probe refused");
                        PrinterStatus::Disconnected
                    }
                    Err(_) => PrinterStatus::Disconnected,
                }
            }
            Self::Device { path } => match tokio::fs::metadata(path).await {
                Ok(_) => PrinterStatus::Connected,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => PrinterStatus::Disconnected,
                Err(_) => PrinterStatus::Error,
            },
        }
    }
}

impl std::fmt::Display for PrinterInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "tcp://{}", socket_target(host, *port)),
            Self::Spooler { name } => write!(f, "printer:{name}"),
            Self::Device { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Split `host[:port]`.  IPv6 literals may be bare (`::1`, default port) or
/// bracketed (`[::1]:9100`).
fn split_host_port(addr: &str) -> std::result::Result<(String, u16), &'static str> {
    if let Ok(socket) = addr.parse::<SocketAddr>() {
        return Ok((socket.ip().to_string(), socket.port()));
    }
    if let Ok(ip) = addr.parse::<IpAddr>() {
        return Ok((ip.to_string(), RAW_PORT));
    }
    if let Some(inner) = addr.strip_prefix('[').and_then(|a| a.strip_suffix(']')) {
        let ip: Ipv6Addr = inner.parse().map_err(|_| "invalid IPv6 address")?;
        return Ok((ip.to_string(), RAW_PORT));
    }
    let (host, port) = match addr.rsplit_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().map_err(|_| "invalid port")?),
        None => (addr, RAW_PORT),
    };
    if host.is_empty() {
        return Err("missing host");
    }
    if host.contains(&[':', '[', ']'][..]) {
        return Err("invalid host");
    }
    Ok((host.to_string(), port))
}

/// `host:port`, bracketing IPv6 literals.
fn socket_target(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

fn interface_err(raw: &str, reason: &str) -> QuittungError {
    QuittungError::Config {
        var: "PRINTER_INTERFACE".into(),
        reason: format!("{raw:?}: {reason}"),
    }
}

async fn send_raw(host: &str, port: u16, bytes: &[u8]) -> Result<()> {
    let addr = socket_target(host, port);
    info!(addr = %addr, total = bytes.len(), "connecting via raw TCP");

    let mut stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| QuittungError::Transport(format!("raw TCP connect to {addr}: {e}")))?;

    let mut sent = 0;
    for chunk in bytes.chunks(CHUNK_SIZE) {
        stream.write_all(chunk).await.map_err(|e| {
            QuittungError::Transport(format!("raw TCP send failed at byte {sent}: {e}"))
        })?;
        sent += chunk.len();
        debug!(sent, total = bytes.len(), "raw TCP progress");
    }

    stream
        .flush()
        .await
        .map_err(|e| QuittungError::Transport(format!("raw TCP flush: {e}")))?;
    stream
        .shutdown()
        .await
        .map_err(|e| QuittungError::Transport(format!("raw TCP shutdown: {e}")))?;
    Ok(())
}

async fn send_spooler(name: &str, bytes: &[u8]) -> Result<()> {
    let mut child = Command::new("lp")
        .args(["-d", name, "-o", "raw"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| QuittungError::Transport(format!("spawn lp for {name:?}: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(bytes)
            .await
            .map_err(|e| QuittungError::Transport(format!("write to lp: {e}")))?;
        // Dropping stdin closes the pipe so lp sees end of input.
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| QuittungError::Transport(format!("wait for lp: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(QuittungError::Delivery(format!(
            "spooler rejected job for {name:?} ({}): {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

async fn send_device(path: &std::path::Path, bytes: &[u8]) -> Result<()> {
    let mut device = tokio::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(|e| QuittungError::Transport(format!("open {}: {e}", path.display())))?;
    device
        .write_all(bytes)
        .await
        .map_err(|e| QuittungError::Transport(format!("write {}: {e}", path.display())))?;
    device
        .flush()
        .await
        .map_err(|e| QuittungError::Transport(format!("flush {}: {e}", path.display())))?;
    Ok(())
}
