//! Transport abstraction and the local IPC transport.
//!
//! The session only needs an ordered, reliable byte stream; anything that is
//! `AsyncRead + AsyncWrite` can back it.

use crate::error::ClientError;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWrite};

/// Number of numbered sockets the host may listen on.
pub const IPC_SLOTS: usize = 10;

/// A connected byte stream.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Boxed stream handed to the session by a transport.
pub type TransportStream = Box<dyn AsyncStream>;

/// Connects to the host application.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a new stream to the host.
    async fn connect(&self) -> Result<TransportStream, ClientError>;

    /// Human-readable description used in logs.
    fn describe(&self) -> String {
        "transport".to_string()
    }
}

/// Local IPC transport: UNIX domain socket or Windows named pipe.
#[derive(Debug, Clone, Default)]
pub struct IpcTransport {
    path: Option<PathBuf>,
}

impl IpcTransport {
    /// Creates a transport that discovers the host socket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport bound to an explicit socket/pipe path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    fn candidates(&self) -> Vec<PathBuf> {
        match &self.path {
            Some(path) => vec![path.clone()],
            None => ipc_candidates(),
        }
    }
}

#[async_trait]
impl Transport for IpcTransport {
    async fn connect(&self) -> Result<TransportStream, ClientError> {
        let mut last_err = None;

        for path in self.candidates() {
            tracing::debug!("Trying IPC endpoint {}", path.display());
            match open_ipc(&path).await {
                Ok(stream) => {
                    tracing::debug!("Connected to {}", path.display());
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::trace!("IPC endpoint {} unavailable: {}", path.display(), e);
                    last_err = Some(e);
                }
            }
        }

        Err(ClientError::Connect(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no IPC endpoint found")
        })))
    }

    fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("ipc:{}", path.display()),
            None => "ipc:auto".to_string(),
        }
    }
}

#[cfg(unix)]
async fn open_ipc(path: &Path) -> io::Result<TransportStream> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    Ok(Box::new(stream))
}

#[cfg(windows)]
async fn open_ipc(path: &Path) -> io::Result<TransportStream> {
    let client = tokio::net::windows::named_pipe::ClientOptions::new().open(path)?;
    Ok(Box::new(client))
}

/// Returns the socket paths the host may listen on, in search order.
#[cfg(unix)]
pub fn ipc_candidates() -> Vec<PathBuf> {
    let base = ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"]
        .iter()
        .filter_map(|key| std::env::var_os(key))
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"));

    candidates_in(&base)
}

/// Returns the pipe names the host may listen on, in search order.
#[cfg(windows)]
pub fn ipc_candidates() -> Vec<PathBuf> {
    (0..IPC_SLOTS)
        .map(|i| PathBuf::from(format!(r"\\?\pipe\discord-ipc-{i}")))
        .collect()
}

/// Socket paths under a runtime directory, including sandboxed installs.
#[cfg_attr(windows, allow(dead_code))]
fn candidates_in(base: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(IPC_SLOTS * 3);
    for i in 0..IPC_SLOTS {
        let name = format!("discord-ipc-{i}");
        paths.push(base.join(&name));
        paths.push(base.join("app/com.discordapp.Discord").join(&name));
        paths.push(base.join("snap.discord").join(&name));
    }
    paths
}

/// Hands out one pre-connected stream.
///
/// Useful for in-process peers and for transports (such as a local
/// websocket bridge) that are established outside the session.
pub struct StreamTransport<S> {
    stream: parking_lot::Mutex<Option<S>>,
}

impl<S> StreamTransport<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: parking_lot::Mutex::new(Some(stream)),
        }
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn connect(&self) -> Result<TransportStream, ClientError> {
        match self.stream.lock().take() {
            Some(stream) => Ok(Box::new(stream)),
            None => Err(ClientError::Connect(io::Error::new(
                io::ErrorKind::NotConnected,
                "stream already consumed",
            ))),
        }
    }

    fn describe(&self) -> String {
        "stream".to_string()
    }
}
