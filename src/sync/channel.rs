//! Synchronizer channel
//!
//! A TCP connection used only for test timing, separate from the debug
//! connection. Each signal is a 2-byte big-endian length followed by
//! UTF-8 text. Exchanges strictly alternate: nothing is queued ahead, so a
//! debuggee blocked in `receive_message` stays blocked until the driver
//! answers.

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::common::config::SyncConfig;
use crate::common::{Error, Result};

/// Longest signal a 2-byte length prefix can carry
const MAX_SIGNAL_LEN: usize = u16::MAX as usize;

/// Explicit channel configuration
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Label attached to every log line (`driver`, `debuggee`, ...)
    pub role: String,
    /// Host the driver binds to and the debuggee connects to
    pub bind_address: String,
    /// Bound on accept/connect
    pub connect_timeout: Duration,
    /// Bound on a single receive
    pub receive_timeout: Duration,
}

impl SyncOptions {
    pub fn from_config(config: &SyncConfig, role: &str) -> Self {
        Self {
            role: role.to_string(),
            bind_address: config.bind_address.clone(),
            connect_timeout: config.connect_timeout(),
            receive_timeout: config.receive_timeout(),
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default(), "sync")
    }
}

/// Lifecycle of a channel; `Closed` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Unbound,
    Bound,
    Connected,
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelState::Unbound => "unbound",
            ChannelState::Bound => "bound",
            ChannelState::Connected => "connected",
            ChannelState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// One end of the synchronization channel
pub struct Synchronizer {
    options: SyncOptions,
    state: ChannelState,
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    port: Option<u16>,
}

impl Synchronizer {
    pub fn new(options: SyncOptions) -> Self {
        Self {
            options,
            state: ChannelState::Unbound,
            listener: None,
            stream: None,
            port: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Bound (driver) or connected-to (debuggee) port
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Driver side: open the listener and return its port
    ///
    /// Must happen before the debuggee is spawned, since the port is one of
    /// its startup parameters.
    pub async fn bind_server(&mut self) -> Result<u16> {
        self.require(ChannelState::Unbound, "bind")?;

        let listener = TcpListener::bind((self.options.bind_address.as_str(), 0)).await?;
        let port = listener.local_addr()?.port();

        tracing::debug!(role = %self.options.role, port, "Sync listener bound");
        self.listener = Some(listener);
        self.port = Some(port);
        self.state = ChannelState::Bound;
        Ok(port)
    }

    /// Driver side: wait for the debuggee to connect
    pub async fn start_server(&mut self) -> Result<()> {
        self.require(ChannelState::Bound, "accept")?;
        let listener = self
            .listener
            .take()
            .ok_or_else(|| Error::Internal("bound channel has no listener".to_string()))?;

        let timeout = self.options.connect_timeout;
        let (stream, peer) = match tokio::time::timeout(timeout, listener.accept()).await {
            Ok(accepted) => accepted?,
            Err(_) => {
                self.state = ChannelState::Closed;
                return Err(Error::ConnectionTimeout(timeout.as_secs()));
            }
        };
        // One physical connection per run: the listener is dropped here
        stream.set_nodelay(true)?;

        tracing::info!(role = %self.options.role, %peer, "Sync connection accepted");
        self.stream = Some(stream);
        self.state = ChannelState::Connected;
        Ok(())
    }

    /// Debuggee side: connect to the driver's port
    pub async fn connect_client(&mut self, port: u16) -> Result<()> {
        self.require(ChannelState::Unbound, "connect")?;

        let addr = (self.options.bind_address.as_str(), port);
        let timeout = self.options.connect_timeout;
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout(timeout.as_secs()))?
            .map_err(|e| {
                if e.kind() == io::ErrorKind::ConnectionRefused {
                    Error::ConnectionRefused(format!("{}:{}", self.options.bind_address, port))
                } else {
                    Error::Io(e)
                }
            })?;
        stream.set_nodelay(true)?;

        tracing::info!(role = %self.options.role, port, "Sync connection established");
        self.stream = Some(stream);
        self.port = Some(port);
        self.state = ChannelState::Connected;
        Ok(())
    }

    /// Send one signal; returns once the transport accepted the bytes
    pub async fn send_message(&mut self, text: &str) -> Result<()> {
        if text.len() > MAX_SIGNAL_LEN {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Signal too large: {} bytes", text.len()),
            )));
        }
        let stream = self.connected_stream("send")?;

        let mut frame = Vec::with_capacity(2 + text.len());
        frame.extend_from_slice(&(text.len() as u16).to_be_bytes());
        frame.extend_from_slice(text.as_bytes());

        let written = async {
            stream.write_all(&frame).await?;
            stream.flush().await
        }
        .await;

        match written {
            Ok(()) => {
                tracing::debug!(role = %self.options.role, signal = text, "Sync >>>");
                Ok(())
            }
            Err(e) if is_disconnect(&e) => {
                self.mark_closed();
                Err(Error::ChannelClosed)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Block until one complete signal arrives
    pub async fn receive_message(&mut self) -> Result<String> {
        let timeout = self.options.receive_timeout;
        let stream = self.connected_stream("receive")?;

        let received = tokio::time::timeout(timeout, read_signal(stream)).await;
        match received {
            Ok(Ok(text)) => {
                tracing::debug!(role = %self.options.role, signal = %text, "Sync <<<");
                Ok(text)
            }
            Ok(Err(Error::ChannelClosed)) => {
                tracing::debug!(role = %self.options.role, "Sync peer closed the channel");
                self.mark_closed();
                Err(Error::ChannelClosed)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                // A cancelled read may have consumed part of a frame
                self.mark_closed();
                Err(Error::Timeout(timeout.as_secs()))
            }
        }
    }

    /// Receive and require an exact signal
    pub async fn receive_expected(&mut self, expected: &str) -> Result<()> {
        let received = self.receive_message().await?;
        if received != expected {
            tracing::warn!(
                role = %self.options.role,
                expected,
                received = %received,
                "Sync lock-step violated"
            );
            return Err(Error::unexpected_signal(expected, &received));
        }
        Ok(())
    }

    /// Close this side; idempotent and safe before any connection
    pub async fn stop(&mut self) {
        if self.state == ChannelState::Closed && self.stream.is_none() {
            return;
        }
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.listener = None;
        if self.state != ChannelState::Closed {
            tracing::debug!(role = %self.options.role, "Sync channel stopped");
        }
        self.state = ChannelState::Closed;
    }

    fn require(&self, expected: ChannelState, action: &str) -> Result<()> {
        if self.state != expected {
            return Err(Error::invalid_state(action, &self.state.to_string()));
        }
        Ok(())
    }

    fn connected_stream(&mut self, action: &str) -> Result<&mut TcpStream> {
        match self.state {
            ChannelState::Connected => self
                .stream
                .as_mut()
                .ok_or_else(|| Error::Internal("connected channel has no stream".to_string())),
            ChannelState::Closed => Err(Error::ChannelClosed),
            state => Err(Error::invalid_state(action, &state.to_string())),
        }
    }

    fn mark_closed(&mut self) {
        self.stream = None;
        self.state = ChannelState::Closed;
    }
}

async fn read_signal(stream: &mut TcpStream) -> Result<String> {
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await.map_err(map_read_error)?;
    let len = u16::from_be_bytes(len_buf) as usize;

    let mut data = vec![0u8; len];
    stream.read_exact(&mut data).await.map_err(map_read_error)?;

    String::from_utf8(data).map_err(|e| {
        Error::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Signal is not UTF-8: {}", e),
        ))
    })
}

fn map_read_error(e: io::Error) -> Error {
    if is_disconnect(&e) {
        Error::ChannelClosed
    } else {
        Error::Io(e)
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}
