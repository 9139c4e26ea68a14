use crate::structures::{ProbeError, ProbeResult, Target};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use tokio::io::unix::AsyncFd;
use tokio::time::{self, Duration, Instant};

/// One raw transport-level attempt against `target`, reported as a
/// `ProbeResult`. `bind_interface` selects the extra bound-socket variant.
pub async fn probe(
    check: impl Into<String>,
    target: &Target,
    timeout: Duration,
    bind_interface: Option<&str>,
) -> ProbeResult {
    let started = Instant::now();
    match bounded_connect(target.addr(), timeout, bind_interface).await {
        // Descriptor closes on drop, right after the attempt.
        Ok(_sock) => ProbeResult::ok(check, target.endpoint(), started.elapsed()),
        Err(e) => ProbeResult::failed(check, target.endpoint(), started.elapsed(), e),
    }
}

/// Non-blocking connect with a bounded readiness wait. Readiness alone does
/// not mean the connect worked: SO_ERROR is queried to split success from a
/// deferred failure, which is where the no-route class surfaces.
pub async fn bounded_connect(
    addr: SocketAddr,
    timeout: Duration,
    bind_interface: Option<&str>,
) -> Result<Socket, ProbeError> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(ProbeError::Socket)?;
    socket.set_nonblocking(true).map_err(ProbeError::Socket)?;

    if let Some(iface) = bind_interface {
        bind_to_interface(&socket, iface, &addr)?;
    }

    match socket.connect(&addr.into()) {
        Ok(()) => return Ok(socket),
        Err(e) if connect_in_progress(&e) => (),
        Err(e) => return Err(ProbeError::Connect(e)),
    }

    let fd = AsyncFd::new(socket).map_err(ProbeError::Socket)?;
    match time::timeout(timeout, fd.writable()).await {
        Err(_) => Err(ProbeError::Timeout(timeout)),
        Ok(Err(e)) => Err(ProbeError::Socket(e)),
        Ok(Ok(guard)) => {
            drop(guard);
            let socket = fd.into_inner();
            match socket.take_error() {
                Ok(None) => Ok(socket),
                Ok(Some(e)) => Err(ProbeError::Rejected(e)),
                Err(e) => Err(ProbeError::Socket(e)),
            }
        }
    }
}

fn connect_in_progress(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EINPROGRESS) || e.kind() == io::ErrorKind::WouldBlock
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn bind_to_interface(socket: &Socket, iface: &str, _addr: &SocketAddr) -> Result<(), ProbeError> {
    socket
        .bind_device(Some(iface.as_bytes()))
        .map_err(ProbeError::Socket)
}

#[cfg(target_os = "macos")]
fn bind_to_interface(socket: &Socket, iface: &str, addr: &SocketAddr) -> Result<(), ProbeError> {
    use std::ffi::CString;
    use std::num::NonZeroU32;

    let name = CString::new(iface)
        .map_err(|_| ProbeError::Socket(io::Error::from(io::ErrorKind::InvalidInput)))?;
    // SAFETY: name is a valid NUL-terminated string for the duration of the call.
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    let index = NonZeroU32::new(index)
        .ok_or_else(|| ProbeError::Socket(io::Error::last_os_error()))?;
    let bound = if addr.is_ipv4() {
        socket.bind_device_by_index_v4(Some(index))
    } else {
        socket.bind_device_by_index_v6(Some(index))
    };
    bound.map_err(ProbeError::Socket)
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
fn bind_to_interface(_socket: &Socket, _iface: &str, _addr: &SocketAddr) -> Result<(), ProbeError> {
    Err(ProbeError::Socket(io::Error::new(
        io::ErrorKind::Unsupported,
        "interface binding not supported on this platform",
    )))
}
