//! Binary RPC transport (primary)
//!
//! Speaks the `lucie-protocol` framed protocol over TCP. One link carries
//! any number of concurrent outstanding calls; responses are matched back
//! to callers by request id through a pending-call map. Call results cross
//! the wire as opaque JSON text and are decoded here; a decode failure is
//! a `MalformedResponse`, distinct from the remote reporting an error.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

use lucie_core::error::BridgeError;
use lucie_core::time::current_time_millis;
use lucie_core::traits::Transport;
use lucie_core::types::{MethodDescriptor, ServiceDescriptor, StreamEvent, TransportKind};
use lucie_protocol::{ErrorCode, Frame, FrameCodec, Message, RequestId, ServiceSpec};

/// Capacity of a streaming call's fragment channel.
///
/// Holds fragments between the reader task and a consumer that is slower
/// than the wire. 64 gives bursty streams headroom without buffering an
/// unbounded backlog on a stalled consumer.
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// A call waiting for its response frames
enum Pending {
    /// Unary call: exactly one result frame
    Unary(oneshot::Sender<Result<Message, BridgeError>>),
    /// Streaming call: chunk frames until one carries `last`
    Stream(mpsc::Sender<StreamEvent>),
}

/// An open link to the RPC endpoint
struct Link {
    writer: FramedWrite<OwnedWriteHalf, FrameCodec>,
    reader_task: JoinHandle<()>,
    alive: Arc<AtomicBool>,
}

/// Primary transport: framed binary RPC over TCP.
///
/// The link is opened lazily by the first probe or call and re-opened
/// transparently after it drops.
pub struct RpcTransport {
    address: String,
    connect_timeout: Duration,
    next_id: AtomicU32,
    pending: Arc<DashMap<u32, Pending>>,
    link: Mutex<Option<Link>>,
}

impl RpcTransport {
    /// Create a transport for the given endpoint address
    pub fn new(address: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
            next_id: AtomicU32::new(1),
            pending: Arc::new(DashMap::new()),
            link: Mutex::new(None),
        }
    }

    /// Open the TCP link if there isn't a live one already
    async fn ensure_link(&self, deadline: Duration) -> Result<(), BridgeError> {
        let mut guard = self.link.lock().await;
        if let Some(link) = guard.as_ref() {
            if link.alive.load(Ordering::SeqCst) {
                return Ok(());
            }
        }
        if let Some(stale) = guard.take() {
            stale.reader_task.abort();
        }

        tracing::debug!(address = %self.address, "opening rpc link");
        let stream = tokio::time::timeout(deadline, TcpStream::connect(&self.address))
            .await
            .map_err(|_| {
                BridgeError::TransportUnreachable(format!(
                    "connect to {} timed out after {:?}",
                    self.address, deadline
                ))
            })?
            .map_err(|e| {
                BridgeError::TransportUnreachable(format!("connect to {}: {}", self.address, e))
            })?;

        let (read_half, write_half) = stream.into_split();
        let alive = Arc::new(AtomicBool::new(true));
        let reader = FramedRead::new(read_half, FrameCodec::new());
        let writer = FramedWrite::new(write_half, FrameCodec::new());
        let reader_task = tokio::spawn(read_loop(
            reader,
            Arc::clone(&self.pending),
            Arc::clone(&alive),
        ));

        *guard = Some(Link {
            writer,
            reader_task,
            alive,
        });
        Ok(())
    }

    /// Write one frame; a failed write marks the link dead
    async fn send_frame(&self, frame: Frame) -> Result<(), BridgeError> {
        let mut guard = self.link.lock().await;
        let link = guard
            .as_mut()
            .ok_or_else(|| BridgeError::TransportUnreachable("rpc link not open".to_string()))?;
        if let Err(e) = link.writer.send(frame).await {
            link.alive.store(false, Ordering::SeqCst);
            return Err(BridgeError::TransportUnreachable(format!(
                "rpc write failed: {}",
                e
            )));
        }
        Ok(())
    }

    /// Send one message and wait for its single response frame
    async fn unary(&self, message: Message, timeout: Duration) -> Result<Message, BridgeError> {
        self.ensure_link(self.connect_timeout).await?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, Pending::Unary(tx));

        if let Err(e) = self.send_frame(Frame::new(RequestId::new(id), message)).await {
            self.pending.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Err(_) => {
                self.pending.remove(&id);
                Err(BridgeError::Timeout(timeout))
            }
            Ok(Err(_)) => Err(BridgeError::TransportUnreachable(
                "rpc link closed mid-call".to_string(),
            )),
            Ok(Ok(result)) => result,
        }
    }
}

#[async_trait]
impl Transport for RpcTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Rpc
    }

    async fn probe(&self, deadline: Duration) -> Result<(), BridgeError> {
        self.ensure_link(deadline).await?;
        let ping = Message::Ping {
            timestamp: current_time_millis(),
        };
        match self.unary(ping, deadline).await? {
            Message::Pong { .. } => Ok(()),
            other => Err(BridgeError::MalformedResponse(format!(
                "unexpected probe response: {:?}",
                other.message_type()
            ))),
        }
    }

    async fn call(
        &self,
        service: &str,
        method: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<Value, BridgeError> {
        let encoded = serde_json::to_string(payload)
            .map_err(|e| BridgeError::MalformedResponse(format!("payload encoding: {}", e)))?;
        let call = Message::Call {
            service: service.to_string(),
            method: method.to_string(),
            payload: encoded,
        };

        match self.unary(call, timeout).await? {
            Message::CallResult { payload } => serde_json::from_str(&payload).map_err(|e| {
                BridgeError::MalformedResponse(format!("{}.{}: {}", service, method, e))
            }),
            other => Err(BridgeError::MalformedResponse(format!(
                "{}.{}: unexpected response {:?}",
                service,
                method,
                other.message_type()
            ))),
        }
    }

    async fn call_streaming(
        &self,
        service: &str,
        method: &str,
        payload: &Value,
    ) -> Result<mpsc::Receiver<StreamEvent>, BridgeError> {
        self.ensure_link(self.connect_timeout).await?;

        let encoded = serde_json::to_string(payload)
            .map_err(|e| BridgeError::MalformedResponse(format!("payload encoding: {}", e)))?;
        let call = Message::Call {
            service: service.to_string(),
            method: method.to_string(),
            payload: encoded,
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        self.pending.insert(id, Pending::Stream(tx));

        if let Err(e) = self.send_frame(Frame::new(RequestId::new(id), call)).await {
            self.pending.remove(&id);
            return Err(e);
        }
        Ok(rx)
    }

    async fn list_services(&self) -> Result<Vec<ServiceDescriptor>, BridgeError> {
        match self
            .unary(Message::ListServices, self.connect_timeout)
            .await?
        {
            Message::ServiceList { services } => {
                Ok(services.into_iter().map(descriptor_from_spec).collect())
            }
            other => Err(BridgeError::MalformedResponse(format!(
                "unexpected discovery response: {:?}",
                other.message_type()
            ))),
        }
    }

    async fn close(&self) {
        let mut guard = self.link.lock().await;
        if let Some(link) = guard.take() {
            link.alive.store(false, Ordering::SeqCst);
            link.reader_task.abort();
        }
        drop(guard);
        fail_pending(&self.pending, "transport closed");
        tracing::debug!("rpc transport closed");
    }
}

/// Drain frames off the link, routing them to waiting callers
async fn read_loop(
    mut reader: FramedRead<OwnedReadHalf, FrameCodec>,
    pending: Arc<DashMap<u32, Pending>>,
    alive: Arc<AtomicBool>,
) {
    while let Some(next) = reader.next().await {
        match next {
            Ok(frame) => dispatch_frame(&pending, frame).await,
            Err(e) => {
                tracing::warn!(error = %e, "rpc read error");
                break;
            }
        }
    }
    alive.store(false, Ordering::SeqCst);
    fail_pending(&pending, "connection closed");
    tracing::debug!("rpc reader stopped");
}

/// Route one inbound frame to the call that is waiting for it
async fn dispatch_frame(pending: &DashMap<u32, Pending>, frame: Frame) {
    let id = frame.request_id.as_u32();
    match frame.message {
        Message::CallChunk { payload, last } => {
            // Clone the sender out so the map ref isn't held across awaits
            let tx = match pending.get(&id) {
                Some(entry) => match entry.value() {
                    Pending::Stream(tx) => Some(tx.clone()),
                    Pending::Unary(_) => None,
                },
                None => None,
            };
            let Some(tx) = tx else {
                tracing::warn!(request = id, "chunk for unknown request");
                return;
            };
            match serde_json::from_str::<Value>(&payload) {
                Ok(fragment) => {
                    let _ = tx.send(StreamEvent::Fragment(fragment)).await;
                    if last {
                        let _ = tx.send(StreamEvent::End).await;
                        pending.remove(&id);
                    }
                }
                Err(e) => {
                    let _ = tx
                        .send(StreamEvent::Failed(format!("malformed fragment: {}", e)))
                        .await;
                    pending.remove(&id);
                }
            }
        }
        other => {
            let Some((_, entry)) = pending.remove(&id) else {
                tracing::warn!(
                    request = id,
                    kind = ?other.message_type(),
                    "response for unknown request"
                );
                return;
            };
            match entry {
                Pending::Unary(tx) => {
                    let result = match other {
                        Message::Error { code, message } => Err(error_from_wire(code, message)),
                        msg => Ok(msg),
                    };
                    let _ = tx.send(result);
                }
                Pending::Stream(tx) => {
                    let event = match other {
                        Message::Error { message, .. } => StreamEvent::Failed(message),
                        _ => StreamEvent::End,
                    };
                    let _ = tx.send(event).await;
                }
            }
        }
    }
}

/// Fail every outstanding call; used when the link drops or closes
fn fail_pending(pending: &DashMap<u32, Pending>, reason: &str) {
    let ids: Vec<u32> = pending.iter().map(|e| *e.key()).collect();
    for id in ids {
        if let Some((_, entry)) = pending.remove(&id) {
            match entry {
                Pending::Unary(tx) => {
                    let _ = tx.send(Err(BridgeError::TransportUnreachable(reason.to_string())));
                }
                Pending::Stream(tx) => {
                    let _ = tx.try_send(StreamEvent::Failed(reason.to_string()));
                }
            }
        }
    }
}

/// Map a wire error frame to the bridge taxonomy
fn error_from_wire(code: ErrorCode, message: String) -> BridgeError {
    match code {
        ErrorCode::ServiceNotFound => BridgeError::ServiceNotFound(message),
        ErrorCode::MethodNotFound => BridgeError::MethodNotFound(message),
        ErrorCode::InvalidPayload => BridgeError::MalformedResponse(message),
        ErrorCode::InvocationFailed | ErrorCode::Unknown => BridgeError::remote(message),
    }
}

/// Build the registry view of one advertised service.
///
/// Metadata that fails to parse degrades to null rather than dropping
/// the whole advertisement.
fn descriptor_from_spec(spec: ServiceSpec) -> ServiceDescriptor {
    let metadata = serde_json::from_str(&spec.metadata).unwrap_or(Value::Null);
    ServiceDescriptor {
        name: spec.name,
        status: spec.status,
        methods: spec.methods.into_iter().map(MethodDescriptor::new).collect(),
        metadata,
    }
}
