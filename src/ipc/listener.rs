//! Endpoints, listeners and streams.
//!
//! The daemon does not care which kind of local channel it serves on, only
//! that it gets an in-order bidirectional byte stream.  Three kinds of
//! [`Endpoint`] are supported:
//!
//! | Syntax        | Endpoint                                   |
//! |---------------|--------------------------------------------|
//! | `tcp:<port>`  | `127.0.0.1:<port>`                         |
//! | `@<name>`     | Linux abstract Unix socket `<name>`        |
//! | anything else | Unix socket at that filesystem path        |

use log::{debug, info};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener, TcpStream};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default endpoint for both the daemon and the CLI.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/snackdaemon.sock";

/// Where the daemon listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A Unix socket on the filesystem.
    Path(PathBuf),
    /// A Linux abstract-namespace Unix socket.
    Abstract(String),
    /// A TCP port on the loopback interface.
    Tcp(u16),
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Path(PathBuf::from(DEFAULT_SOCKET_PATH))
    }
}

/// An endpoint string could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("invalid endpoint {0:?}")]
pub struct EndpointParseError(String);

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(port) = s.strip_prefix("tcp:") {
            return port
                .parse()
                .map(Endpoint::Tcp)
                .map_err(|_| EndpointParseError(s.to_owned()));
        }
        if let Some(name) = s.strip_prefix('@') {
            if name.is_empty() {
                return Err(EndpointParseError(s.to_owned()));
            }
            return Ok(Endpoint::Abstract(name.to_owned()));
        }
        if s.is_empty() {
            return Err(EndpointParseError(s.to_owned()));
        }
        Ok(Endpoint::Path(PathBuf::from(s)))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Path(path) => write!(f, "{}", path.display()),
            Endpoint::Abstract(name) => write!(f, "@{}", name),
            Endpoint::Tcp(port) => write!(f, "tcp:{}", port),
        }
    }
}

impl Endpoint {
    /// The filesystem path backing this endpoint, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Endpoint::Path(path) => Some(path.as_path()),
            Endpoint::Abstract(_) | Endpoint::Tcp(_) => None,
        }
    }

    fn loopback(port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)
    }
}

#[cfg(target_os = "linux")]
fn abstract_addr(name: &str) -> io::Result<std::os::unix::net::SocketAddr> {
    use std::os::linux::net::SocketAddrExt;
    std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())
}

#[cfg(not(target_os = "linux"))]
fn abstract_addr(_name: &str) -> io::Result<std::os::unix::net::SocketAddr> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "abstract sockets are only available on Linux",
    ))
}

//  Streams

/// A connected byte stream, whatever the endpoint kind.
#[derive(Debug)]
pub enum Stream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Stream {
    /// Connect to `endpoint`.
    pub fn connect(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint {
            Endpoint::Path(path) => UnixStream::connect(path).map(Stream::Unix),
            Endpoint::Abstract(name) => {
                UnixStream::connect_addr(&abstract_addr(name)?).map(Stream::Unix)
            }
            Endpoint::Tcp(port) => TcpStream::connect(Endpoint::loopback(*port)).map(Stream::Tcp),
        }
    }

    /// Apply the same read and write timeout.
    pub fn set_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Stream::Unix(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
            Stream::Tcp(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Unix(s) => s.read(buf),
            Stream::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Unix(s) => s.write(buf),
            Stream::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Unix(s) => s.flush(),
            Stream::Tcp(s) => s.flush(),
        }
    }
}

//  Listener

#[derive(Debug)]
enum Inner {
    Unix(UnixListener),
    Tcp(TcpListener),
}

/// A bound endpoint accepting one [`Stream`] at a time.
///
/// A filesystem socket is removed again when the listener is dropped, so
/// once the daemon stops nobody can connect to it.
#[derive(Debug)]
pub struct Listener {
    inner: Inner,
    endpoint: Endpoint,
}

impl Listener {
    /// Bind `endpoint`.
    ///
    /// A filesystem socket path must not exist yet; clearing a stale one is
    /// the caller's decision.
    pub fn bind(endpoint: &Endpoint) -> io::Result<Self> {
        let inner = match endpoint {
            Endpoint::Path(path) => Inner::Unix(UnixListener::bind(path)?),
            Endpoint::Abstract(name) => Inner::Unix(UnixListener::bind_addr(&abstract_addr(name)?)?),
            Endpoint::Tcp(port) => Inner::Tcp(TcpListener::bind(Endpoint::loopback(*port))?),
        };
        info!("listening on {}", endpoint);
        Ok(Self {
            inner,
            endpoint: endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The actual TCP port, useful after binding `tcp:0`.
    pub fn local_port(&self) -> Option<u16> {
        match &self.inner {
            Inner::Tcp(l) => l.local_addr().ok().map(|a| a.port()),
            Inner::Unix(_) => None,
        }
    }

    /// Block until the next client connects.
    pub fn accept(&self) -> io::Result<Stream> {
        let stream = match &self.inner {
            Inner::Unix(l) => Stream::Unix(l.accept()?.0),
            Inner::Tcp(l) => Stream::Tcp(l.accept()?.0),
        };
        debug!("client connected");
        Ok(stream)
    }
}

/// A source of client connections, one at a time.
pub trait Incoming {
    /// Block until the next client connects.
    fn accept(&self) -> io::Result<Stream>;
}

impl Incoming for Listener {
    fn accept(&self) -> io::Result<Stream> {
        Listener::accept(self)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(path) = self.endpoint.path() {
            if std::fs::remove_file(path).is_ok() {
                debug!("removed {}", path.display());
            }
        }
    }
}

//  Tests
