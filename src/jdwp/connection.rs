//! JDWP connection to a debug agent
//!
//! A background task owns the read half and demultiplexes incoming frames:
//! replies go to whoever is waiting on that id, everything else is an
//! event and is buffered until the driver asks for it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::common::config::AgentConfig;
use crate::common::{Error, Result};

use super::codec;
use super::constants::{command_sets, vm_commands};
use super::packet::{CommandPacket, EventPacket, Packet, ReplyPacket};
use super::payload::PayloadReader;

/// Reply waiters, closed for good once the reader stops
#[derive(Default)]
struct Pending {
    waiters: HashMap<u32, oneshot::Sender<ReplyPacket>>,
    closed: bool,
}

impl Pending {
    fn register(&mut self, id: u32) -> Result<oneshot::Receiver<ReplyPacket>> {
        if self.closed {
            return Err(Error::AgentDisconnected);
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(id, tx);
        Ok(rx)
    }

    /// Dropping the senders wakes every waiter with `AgentDisconnected`
    fn close(&mut self) {
        self.closed = true;
        self.waiters.clear();
    }
}

type PendingReplies = Arc<Mutex<Pending>>;

/// Reply body of `VirtualMachine.Version`
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VmVersion {
    pub description: String,
    pub jdwp_major: i32,
    pub jdwp_minor: i32,
    pub vm_version: String,
    pub vm_name: String,
}

impl VmVersion {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = PayloadReader::new(data);
        Ok(Self {
            description: reader.string()?,
            jdwp_major: reader.i32()?,
            jdwp_minor: reader.i32()?,
            vm_version: reader.string()?,
            vm_name: reader.string()?,
        })
    }
}

/// Connection to a debug agent
pub struct JdwpConnection {
    /// Buffered writer for the socket
    writer: BufWriter<OwnedWriteHalf>,
    /// Next command id
    next_id: AtomicU32,
    /// Commands waiting for their reply
    pending: PendingReplies,
    /// Buffered events not yet consumed
    event_rx: Option<mpsc::UnboundedReceiver<EventPacket>>,
    /// Background reader
    reader_task: JoinHandle<()>,
    /// Reply wait bound
    reply_timeout: Duration,
}

impl JdwpConnection {
    /// Connect to an agent listening at `addr` and perform the handshake
    pub async fn connect(addr: &str, config: &AgentConfig) -> Result<Self> {
        let timeout = config.handshake_timeout();

        let mut stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout(timeout.as_secs()))?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::ConnectionRefused {
                    Error::ConnectionRefused(addr.to_string())
                } else {
                    Error::Io(e)
                }
            })?;
        stream.set_nodelay(true)?;

        codec::handshake(&mut stream, timeout).await?;
        tracing::info!(agent = %addr, "JDWP handshake complete");

        Ok(Self::from_stream(stream, config))
    }

    /// Wrap an already handshaken stream
    pub fn from_stream(stream: TcpStream, config: &AgentConfig) -> Self {
        let (read_half, write_half) = stream.into_split();
        let pending: PendingReplies = Arc::new(Mutex::new(Pending::default()));
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let reader_task = tokio::spawn(read_loop(
            BufReader::new(read_half),
            config.max_packet_bytes,
            pending.clone(),
            event_tx,
        ));

        Self {
            writer: BufWriter::new(write_half),
            next_id: AtomicU32::new(1),
            pending,
            event_rx: Some(event_rx),
            reader_task,
            reply_timeout: config.reply_timeout(),
        }
    }

    /// Take the event receiver for a dedicated consumer (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<EventPacket>> {
        self.event_rx.take()
    }

    fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Send a command and wait for the reply with the same id
    ///
    /// Events arriving meanwhile stay buffered.
    pub async fn send_command(
        &mut self,
        command_set: u8,
        command: u8,
        payload: Vec<u8>,
    ) -> Result<ReplyPacket> {
        let id = self.next_id();
        let frame = CommandPacket::new(command_set, command, id, payload).to_bytes()?;

        // Registering under the lock orders this against the reader closing
        let registered = self.pending.lock().await.register(id);
        let rx = match registered {
            Ok(rx) => rx,
            Err(e) => {
                let _ = self.writer.shutdown().await;
                return Err(e);
            }
        };

        tracing::debug!(id, command_set, command, len = frame.len(), "JDWP >>> command");
        if let Err(e) = codec::write_frame(&mut self.writer, &frame).await {
            self.pending.lock().await.waiters.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.reply_timeout, rx).await {
            Ok(Ok(reply)) => {
                tracing::debug!(
                    id,
                    error_code = reply.error_code(),
                    len = reply.length(),
                    "JDWP <<< reply"
                );
                Ok(reply)
            }
            Ok(Err(_)) => Err(Error::AgentDisconnected),
            Err(_) => {
                self.pending.lock().await.waiters.remove(&id);
                Err(Error::Timeout(self.reply_timeout.as_secs()))
            }
        }
    }

    /// Send a command and return the reply data, failing on a non-zero error code
    pub async fn request(&mut self, command_set: u8, command: u8, payload: Vec<u8>) -> Result<Vec<u8>> {
        let reply = self.send_command(command_set, command, payload).await?;
        if !reply.is_success() {
            return Err(Error::ReplyError {
                command_set,
                command,
                error_code: reply.error_code(),
            });
        }
        Ok(reply.into_data())
    }

    /// Wait for the next buffered or incoming event
    pub async fn next_event(&mut self, timeout: Duration) -> Result<EventPacket> {
        let rx = self
            .event_rx
            .as_mut()
            .ok_or_else(|| Error::Internal("event receiver was taken".to_string()))?;

        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(Error::AgentDisconnected),
            Err(_) => Err(Error::Timeout(timeout.as_secs())),
        }
    }

    /// Pop an already buffered event without waiting
    pub fn try_next_event(&mut self) -> Option<EventPacket> {
        self.event_rx.as_mut()?.try_recv().ok()
    }

    /// `VirtualMachine.Version`
    pub async fn vm_version(&mut self) -> Result<VmVersion> {
        let data = self
            .request(command_sets::VIRTUAL_MACHINE, vm_commands::VERSION, Vec::new())
            .await?;
        VmVersion::parse(&data)
    }

    /// `VirtualMachine.Resume`
    pub async fn vm_resume(&mut self) -> Result<()> {
        self.request(command_sets::VIRTUAL_MACHINE, vm_commands::RESUME, Vec::new())
            .await?;
        Ok(())
    }

    /// `VirtualMachine.Suspend`
    pub async fn vm_suspend(&mut self) -> Result<()> {
        self.request(command_sets::VIRTUAL_MACHINE, vm_commands::SUSPEND, Vec::new())
            .await?;
        Ok(())
    }

    /// `VirtualMachine.Dispose`, then close the connection
    pub async fn vm_dispose(mut self) -> Result<()> {
        let result = self
            .request(command_sets::VIRTUAL_MACHINE, vm_commands::DISPOSE, Vec::new())
            .await;
        self.close().await;
        result.map(|_| ())
    }

    /// Whether the reader task is still running
    pub fn is_open(&self) -> bool {
        !self.reader_task.is_finished()
    }

    /// Close both directions of the connection
    pub async fn close(&mut self) {
        let _ = self.writer.shutdown().await;
        self.reader_task.abort();
        self.pending.lock().await.close();
    }
}

impl Drop for JdwpConnection {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

async fn read_loop(
    mut reader: BufReader<OwnedReadHalf>,
    max_len: u32,
    pending: PendingReplies,
    event_tx: mpsc::UnboundedSender<EventPacket>,
) {
    loop {
        let packet = match codec::read_packet(&mut reader, max_len).await {
            Ok(packet) => packet,
            Err(Error::AgentDisconnected) => {
                tracing::debug!("Debug agent closed the connection");
                break;
            }
            Err(e) => {
                // Frame boundary lost; no resynchronization
                tracing::error!(error = %e, "Dropping JDWP connection");
                break;
            }
        };

        match packet {
            Packet::Reply(reply) => {
                let waiter = pending.lock().await.waiters.remove(&reply.id());
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(reply);
                    }
                    None => {
                        tracing::warn!(id = reply.id(), "Reply with no pending command, dropped");
                    }
                }
            }
            Packet::Command(command) => {
                let event = EventPacket::from(command);
                tracing::trace!(
                    id = event.id(),
                    command_set = event.command_set(),
                    command = event.command(),
                    "JDWP <<< event"
                );
                if event_tx.send(event).is_err() {
                    break;
                }
            }
            Packet::Event(event) => {
                if event_tx.send(event).is_err() {
                    break;
                }
            }
        }
    }

    pending.lock().await.close();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_pending_rejects_new_waiters() {
        let mut pending = Pending::default();
        let rx = pending.register(1).unwrap();

        pending.close();
        assert!(rx.await.is_err());
        assert!(matches!(pending.register(2), Err(Error::AgentDisconnected)));
    }
}
