//! Socket activation.
//!
//! Implements the receiving half of the systemd `LISTEN_FDS` protocol so the
//! service can serve privileged ports without binding them itself:
//! - `LISTEN_PID` must equal our pid, otherwise the variables were meant for someone else
//! - `LISTEN_FDS` descriptors are passed starting at fd 3
//! - `LISTEN_FDNAMES` optionally names them, colon separated

use std::env;

#[cfg(unix)]
use socket2::{SockRef, Type};

/// First inherited descriptor (`SD_LISTEN_FDS_START`).
pub const LISTEN_FDS_START: i32 = 3;

/// A descriptor handed over by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InheritedFd {
    pub fd: i32,
    pub name: String,
}

/// Decode the activation variables. Returns nothing unless they target `own_pid`.
pub fn inherited_fds(
    listen_pid: Option<&str>,
    listen_fds: Option<&str>,
    fd_names: Option<&str>,
    own_pid: u32,
) -> Vec<InheritedFd> {
    let pid = listen_pid.and_then(|pid| pid.trim().parse::<u32>().ok());
    if pid != Some(own_pid) {
        return Vec::new();
    }

    let count = match listen_fds.and_then(|n| n.trim().parse::<i32>().ok()) {
        Some(n) if n > 0 => n,
        _ => return Vec::new(),
    };

    let names: Vec<&str> = fd_names.map(|n| n.split(':').collect()).unwrap_or_default();

    (0..count)
        .map(|offset| {
            let fd = LISTEN_FDS_START + offset;
            let name = names
                .get(offset as usize)
                .filter(|name| !name.is_empty())
                .map(|name| name.to_string())
                .unwrap_or_else(|| format!("LISTEN_FD_{}", fd));
            InheritedFd { fd, name }
        })
        .collect()
}

/// Descriptors passed to this process, read from the environment.
pub fn inherited_from_env() -> Vec<InheritedFd> {
    let pid = env::var("LISTEN_PID").ok();
    let fds = env::var("LISTEN_FDS").ok();
    let names = env::var("LISTEN_FDNAMES").ok();
    inherited_fds(pid.as_deref(), fds.as_deref(), names.as_deref(), std::process::id())
}

/// One slot per inherited descriptor; `None` where it is not a TCP listener.
#[cfg(unix)]
pub fn listeners() -> Vec<Option<std::net::TcpListener>> {
    inherited_from_env().iter().map(adopt).collect()
}

#[cfg(not(unix))]
pub fn listeners() -> Vec<Option<std::net::TcpListener>> {
    Vec::new()
}

#[cfg(unix)]
fn adopt(inherited: &InheritedFd) -> Option<std::net::TcpListener> {
    use std::os::fd::FromRawFd;

    // SAFETY: LISTEN_PID matched our pid, so these descriptors were passed to this
    // process and are owned by nothing else. Each one is adopted exactly once.
    let raw = unsafe { std::net::TcpListener::from_raw_fd(inherited.fd) };

    // The inherited descriptor is not close-on-exec; the duplicate is.
    let listener = match raw.try_clone() {
        Ok(listener) => listener,
        Err(e) => {
            tracing::warn!(fd = inherited.fd, name = %inherited.name, error = %e, "Failed to adopt inherited socket");
            return None;
        }
    };
    drop(raw);

    match is_tcp_listener(&listener) {
        Ok(true) => {
            tracing::debug!(
                fd = inherited.fd,
                name = %inherited.name,
                address = ?listener.local_addr().ok(),
                "Adopted inherited socket"
            );
            Some(listener)
        }
        Ok(false) => {
            tracing::debug!(fd = inherited.fd, name = %inherited.name, "Inherited descriptor is not a TCP listener");
            None
        }
        Err(e) => {
            tracing::debug!(fd = inherited.fd, name = %inherited.name, error = %e, "Failed to inspect inherited descriptor");
            None
        }
    }
}

/// A listening IPv4/IPv6 stream socket.
#[cfg(unix)]
fn is_tcp_listener(listener: &std::net::TcpListener) -> std::io::Result<bool> {
    let socket = SockRef::from(listener);
    if socket.r#type()? != Type::STREAM {
        return Ok(false);
    }
    if socket.local_addr()?.as_socket().is_none() {
        return Ok(false);
    }
    accepts_connections(&socket)
}

#[cfg(any(target_os = "android", target_os = "freebsd", target_os = "fuchsia", target_os = "linux"))]
fn accepts_connections(socket: &SockRef<'_>) -> std::io::Result<bool> {
    socket.is_listener()
}

// No SO_ACCEPTCONN here; a listening socket has no peer.
#[cfg(all(
    unix,
    not(any(target_os = "android", target_os = "freebsd", target_os = "fuchsia", target_os = "linux"))
))]
fn accepts_connections(socket: &SockRef<'_>) -> std::io::Result<bool> {
    Ok(socket.peer_addr().is_err())
}
