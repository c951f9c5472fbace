//! ATT Client implementation
//!
//! An [`AttClient`] is a handle to a connection task that exclusively owns the
//! transport and every piece of correlation state: the FIFO of outstanding
//! reads, the FIFO of outstanding writes and the notification callbacks.
//! Callers submit commands over a channel and are woken through a oneshot
//! when the connection task observes the matching response.
use super::constants::*;
use super::error::{AttError, AttErrorCode, AttResult};
use super::opcode::Opcode;
use super::pdu::{self, AttPdu};
use super::transport::AttTransport;
use super::types::{ClientConfiguration, ErrorResponse, Handle};
use crate::l2cap::{L2capAddr, L2capSocket, SecurityLevel};
use log::{debug, error, info, trace, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time;

/// Value notification callback
///
/// Runs on the connection task; it must not block.
pub type NotificationCallback = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// ATT client configuration
#[derive(Debug, Clone)]
pub struct AttClientConfig {
    /// How long `write`, `subscribe` and `unsubscribe` wait for the peer
    pub transaction_timeout: Duration,
    /// Number of commands that may queue up for the connection task
    pub command_queue_depth: usize,
}

impl Default for AttClientConfig {
    fn default() -> Self {
        Self {
            transaction_timeout: ATT_TRANSACTION_TIMEOUT,
            command_queue_depth: ATT_COMMAND_QUEUE_DEPTH,
        }
    }
}

/// Change to the callback table applied when a CCC write is acknowledged
enum SubscriptionChange {
    None,
    Register(Handle, NotificationCallback),
    Remove(Handle),
}

enum Command {
    Read {
        id: u64,
        handle: Handle,
        reply: oneshot::Sender<AttResult<Vec<u8>>>,
    },
    Write {
        id: u64,
        handle: Handle,
        value: Vec<u8>,
        on_ack: SubscriptionChange,
        reply: oneshot::Sender<AttResult<()>>,
    },
    WriteCommand {
        handle: Handle,
        value: Vec<u8>,
        reply: oneshot::Sender<AttResult<()>>,
    },
    /// The caller gave up waiting on request `id`
    Withdraw { id: u64 },
}

struct PendingRead {
    id: u64,
    handle: Handle,
    reply: oneshot::Sender<AttResult<Vec<u8>>>,
}

struct PendingWrite {
    id: u64,
    handle: Handle,
    on_ack: SubscriptionChange,
    reply: oneshot::Sender<AttResult<()>>,
}

/// ATT Client
pub struct AttClient {
    /// Command channel into the connection task
    commands: mpsc::Sender<Command>,
    /// Client configuration
    config: AttClientConfig,
    /// Request identifier source
    next_id: AtomicU64,
    /// Connection task
    task: JoinHandle<AttResult<()>>,
}

impl AttClient {
    /// Start a client over an already connected transport
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<T: AttTransport>(transport: T) -> Self {
        Self::with_config(transport, AttClientConfig::default())
    }

    /// Start a client over an already connected transport with the given configuration
    pub fn with_config<T: AttTransport>(transport: T, config: AttClientConfig) -> Self {
        let (commands, command_rx) = mpsc::channel(config.command_queue_depth.max(1));

        let connection = Connection {
            transport,
            commands: command_rx,
            pending_reads: VecDeque::new(),
            pending_writes: VecDeque::new(),
            subscriptions: HashMap::new(),
        };
        let task = tokio::spawn(connection.run());

        Self {
            commands,
            config,
            next_id: AtomicU64::new(1),
            task,
        }
    }

    /// Open an L2CAP ATT channel from `local` to `remote` and start a client on it
    pub async fn connect(
        local: &L2capAddr,
        remote: &L2capAddr,
        config: AttClientConfig,
    ) -> AttResult<Self> {
        let socket = L2capSocket::bind(local, SecurityLevel::Low)?;
        socket.connect(remote).await?;
        info!("Connected ATT channel to {}", remote);
        Ok(Self::with_config(socket, config))
    }

    /// Client configuration
    pub fn config(&self) -> &AttClientConfig {
        &self.config
    }

    /// Check whether the connection task is still running
    pub fn is_connected(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Read the value of `handle`, waiting at most `timeout` for the response
    pub async fn read(&self, handle: impl Into<Handle>, timeout: Duration) -> AttResult<Vec<u8>> {
        let handle = handle.into();
        let id = self.next_id();
        let (reply, response) = oneshot::channel();

        self.submit(Command::Read { id, handle, reply }).await?;

        match time::timeout(timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AttError::ConnectionClosed),
            Err(_) => {
                self.withdraw(id).await;
                Err(AttError::ReadTimeout(handle))
            }
        }
    }

    /// Write `value` to `handle` and wait for the peer's acknowledgement
    pub async fn write(&self, handle: impl Into<Handle>, value: &[u8]) -> AttResult<()> {
        self.write_request(handle.into(), value.to_vec(), SubscriptionChange::None)
            .await
    }

    /// Write `value` to `handle` without asking for an acknowledgement
    pub async fn write_command(&self, handle: impl Into<Handle>, value: &[u8]) -> AttResult<()> {
        let (reply, sent) = oneshot::channel();

        self.submit(Command::WriteCommand {
            handle: handle.into(),
            value: value.to_vec(),
            reply,
        })
        .await?;

        sent.await.map_err(|_| AttError::ConnectionClosed)?
    }

    /// Enable notifications on `handle` and deliver them to `callback`
    ///
    /// The callback is registered once the peer acknowledges the write to the
    /// CCC descriptor at `handle + 1`, replacing any earlier callback.
    pub async fn subscribe<F>(&self, handle: impl Into<Handle>, callback: F) -> AttResult<()>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        self.configure(handle.into(), ClientConfiguration::NOTIFY, Box::new(callback))
            .await
    }

    /// Enable indications on `handle` and deliver them to `callback`
    ///
    /// Every indication is confirmed to the peer after the callback returns.
    pub async fn subscribe_indications<F>(
        &self,
        handle: impl Into<Handle>,
        callback: F,
    ) -> AttResult<()>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        self.configure(handle.into(), ClientConfiguration::INDICATE, Box::new(callback))
            .await
    }

    /// Disable notifications and indications on `handle` and drop its callback
    pub async fn unsubscribe(&self, handle: impl Into<Handle>) -> AttResult<()> {
        let handle = handle.into();
        let ccc = handle.ccc()?;
        self.write_request(
            ccc,
            ATT_CCC_NONE.to_le_bytes().to_vec(),
            SubscriptionChange::Remove(handle),
        )
        .await
    }

    /// Stop the connection task and close the transport
    ///
    /// Outstanding requests resolve with [`AttError::ConnectionClosed`]. Returns
    /// the error that ended the connection, if it had already failed.
    pub async fn close(self) -> AttResult<()> {
        let AttClient { commands, task, .. } = self;
        drop(commands);

        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!("ATT connection task failed: {}", e);
                Err(AttError::ConnectionClosed)
            }
        }
    }

    async fn configure(
        &self,
        handle: Handle,
        configuration: ClientConfiguration,
        callback: NotificationCallback,
    ) -> AttResult<()> {
        let ccc = handle.ccc()?;
        self.write_request(
            ccc,
            configuration.to_value(),
            SubscriptionChange::Register(handle, callback),
        )
        .await
    }

    async fn write_request(
        &self,
        handle: Handle,
        value: Vec<u8>,
        on_ack: SubscriptionChange,
    ) -> AttResult<()> {
        let id = self.next_id();
        let (reply, response) = oneshot::channel();

        self.submit(Command::Write {
            id,
            handle,
            value,
            on_ack,
            reply,
        })
        .await?;

        match time::timeout(self.config.transaction_timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AttError::ConnectionClosed),
            Err(_) => {
                self.withdraw(id).await;
                Err(AttError::WriteTimeout(handle))
            }
        }
    }

    async fn submit(&self, command: Command) -> AttResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AttError::ConnectionClosed)
    }

    async fn withdraw(&self, id: u64) {
        // Nothing to withdraw once the connection task is gone
        let _ = self.commands.send(Command::Withdraw { id }).await;
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// State owned by the connection task
struct Connection<T> {
    transport: T,
    commands: mpsc::Receiver<Command>,
    pending_reads: VecDeque<PendingRead>,
    pending_writes: VecDeque<PendingWrite>,
    subscriptions: HashMap<Handle, NotificationCallback>,
}

impl<T: AttTransport> Connection<T> {
    async fn run(mut self) -> AttResult<()> {
        let result = loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if let Err(e) = self.handle_command(command).await {
                            break Err(e);
                        }
                    }
                    None => {
                        debug!("ATT client handle dropped, closing connection");
                        break Ok(());
                    }
                },
                frame = self.transport.read_frame() => match frame {
                    Ok(frame) => {
                        if let Err(e) = self.handle_frame(&frame).await {
                            break Err(e);
                        }
                    }
                    Err(e) => break Err(AttError::Transport(e)),
                },
            }
        };

        if let Err(e) = &result {
            error!("ATT connection terminated: {}", e);
        }

        self.commands.close();
        self.fail_pending();

        if let Err(e) = self.transport.close().await {
            debug!("Error closing ATT transport: {}", e);
        }

        result
    }

    async fn handle_command(&mut self, command: Command) -> AttResult<()> {
        match command {
            Command::Read { id, handle, reply } => {
                self.pending_reads.push_back(PendingRead { id, handle, reply });
                self.send_frame(&pdu::encode_read_request(handle)).await
            }
            Command::Write {
                id,
                handle,
                value,
                on_ack,
                reply,
            } => {
                let frame = pdu::encode_write_request(handle, &value);
                self.pending_writes.push_back(PendingWrite {
                    id,
                    handle,
                    on_ack,
                    reply,
                });
                self.send_frame(&frame).await
            }
            Command::WriteCommand {
                handle,
                value,
                reply,
            } => {
                self.send_frame(&pdu::encode_write_command(handle, &value))
                    .await?;
                let _ = reply.send(Ok(()));
                Ok(())
            }
            Command::Withdraw { id } => {
                self.withdraw(id);
                Ok(())
            }
        }
    }

    async fn handle_frame(&mut self, frame: &[u8]) -> AttResult<()> {
        trace!("ATT rx {}", hex::encode(frame));

        let pdu = match pdu::decode(frame) {
            Ok(pdu) => pdu,
            Err(e) => {
                warn!("Dropping malformed ATT frame {}: {}", hex::encode(frame), e);
                return Ok(());
            }
        };

        match pdu {
            AttPdu::HandleValueNotification(ntf) => {
                self.dispatch_notification(ntf.handle, &ntf.value);
            }
            AttPdu::HandleValueIndication(ind) => {
                self.dispatch_notification(ind.handle, &ind.value);
                self.send_frame(&pdu::encode_handle_value_confirmation())
                    .await?;
            }
            AttPdu::ReadResponse(rsp) => self.complete_read(rsp.value),
            AttPdu::WriteResponse => self.complete_write(),
            AttPdu::ErrorResponse(rsp) => self.fail_request(rsp),
            AttPdu::FindByTypeValueRequest(req) => {
                debug!(
                    "Rejecting find by type value request for 0x{:04X} in {}..{}",
                    req.attribute_type, req.start_handle, req.end_handle
                );
                let rsp = pdu::encode_error_response(
                    Opcode::FindByTypeValueRequest,
                    Handle::new(0),
                    AttErrorCode::RequestNotSupported,
                );
                self.send_frame(&rsp).await?;
            }
            other => warn!("Unhandled ATT PDU {}", other.opcode()),
        }

        Ok(())
    }

    fn dispatch_notification(&mut self, handle: Handle, value: &[u8]) {
        match self.subscriptions.get_mut(&handle) {
            Some(callback) => callback(value),
            None => warn!(
                "Unhandled notification on handle {}: {}",
                handle,
                hex::encode(value)
            ),
        }
    }

    fn complete_read(&mut self, value: Vec<u8>) {
        let Some(pending) = self.pending_reads.pop_front() else {
            warn!("Discarding read response with no outstanding read request");
            return;
        };

        if pending.reply.send(Ok(value)).is_err() {
            debug!("Read of {} was abandoned, discarding response", pending.handle);
        }
    }

    fn complete_write(&mut self) {
        let Some(pending) = self.pending_writes.pop_front() else {
            warn!("Discarding write response with no outstanding write request");
            return;
        };

        if pending.reply.is_closed() {
            debug!("Write to {} was abandoned, discarding response", pending.handle);
            return;
        }

        match pending.on_ack {
            SubscriptionChange::None => {}
            SubscriptionChange::Register(handle, callback) => {
                debug!("Subscribed to handle {}", handle);
                self.subscriptions.insert(handle, callback);
            }
            SubscriptionChange::Remove(handle) => {
                debug!("Unsubscribed from handle {}", handle);
                self.subscriptions.remove(&handle);
            }
        }

        let _ = pending.reply.send(Ok(()));
    }

    fn fail_request(&mut self, rsp: ErrorResponse) {
        debug!(
            "ATT error {:?} for {} on handle {}",
            rsp.error_code, rsp.request_opcode, rsp.handle
        );

        let error = AttError::Protocol {
            request: rsp.request_opcode,
            handle: rsp.handle,
            code: rsp.error_code,
        };

        // Errors that name no attribute carry handle 0x0000 and answer the
        // oldest outstanding request of that kind
        match rsp.request_opcode {
            Opcode::ReadRequest => {
                let position = self
                    .pending_reads
                    .iter()
                    .position(|p| p.handle == rsp.handle)
                    .or_else(|| (!self.pending_reads.is_empty()).then_some(0));
                if let Some(pending) = position.and_then(|i| self.pending_reads.remove(i)) {
                    let _ = pending.reply.send(Err(error));
                    return;
                }
            }
            Opcode::WriteRequest => {
                let position = self
                    .pending_writes
                    .iter()
                    .position(|p| p.handle == rsp.handle)
                    .or_else(|| (!self.pending_writes.is_empty()).then_some(0));
                if let Some(pending) = position.and_then(|i| self.pending_writes.remove(i)) {
                    let _ = pending.reply.send(Err(error));
                    return;
                }
            }
            _ => {}
        }

        debug!("No outstanding request matches error response");
    }

    fn withdraw(&mut self, id: u64) {
        if let Some(i) = self.pending_reads.iter().position(|p| p.id == id) {
            if let Some(pending) = self.pending_reads.remove(i) {
                debug!("Read of {} timed out", pending.handle);
            }
        } else if let Some(i) = self.pending_writes.iter().position(|p| p.id == id) {
            if let Some(pending) = self.pending_writes.remove(i) {
                debug!("Write to {} timed out", pending.handle);
            }
        }
    }

    fn fail_pending(&mut self) {
        for pending in self.pending_reads.drain(..) {
            let _ = pending.reply.send(Err(AttError::ConnectionClosed));
        }
        for pending in self.pending_writes.drain(..) {
            let _ = pending.reply.send(Err(AttError::ConnectionClosed));
        }
    }

    async fn send_frame(&mut self, frame: &[u8]) -> AttResult<()> {
        trace!("ATT tx {}", hex::encode(frame));
        self.transport.write_frame(frame).await?;
        Ok(())
    }
}
