//! Connection engine.
//!
//! One `Connection` per transport stream. It owns the write half, the
//! pending-request table, the subscription registry and the activity rate
//! limiter. A spawned read loop owns the read half and the decoder; it is the
//! only place frames are decoded.

use crate::config::SessionConfig;
use crate::dispatcher::{RequestDispatcher, Resolution};
use crate::error::ClientError;
use crate::handshake::HandshakeNegotiator;
use crate::oauth::AccessToken;
use crate::rate_limit::{ActivityOutcome, ActivityRateLimiter, Admission};
use crate::router::EventRouter;
use crate::state::{SessionEvent, SessionState, StateCell};
use crate::transport::{Transport, TransportStream};
use drpc_protocol::{
    Command, Decoder, Encoder, Frame, Message, Opcode, ProtocolError, ReadyData, Request,
    RpcErrorData,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Upper bound for writing the CLOSE frame during `close()`.
const CLOSE_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Authentication results scoped to one connection.
#[derive(Debug, Clone, Default)]
pub(crate) struct AuthInfo {
    pub token: Option<AccessToken>,
    pub user: Option<Value>,
    pub application: Option<Value>,
}

/// Why a connection ended.
#[derive(Debug)]
enum Teardown {
    /// The host sent a CLOSE frame.
    PeerClosed(RpcErrorData),
    /// The transport reached EOF.
    Eof,
    /// Transport or protocol failure.
    Failed(ClientError),
    /// `close()` was called.
    Local,
}

/// A handshaken connection to the host.
pub struct Connection {
    config: SessionConfig,
    ready: ReadyData,
    writer: Mutex<Option<WriteHalf<TransportStream>>>,
    dispatcher: RequestDispatcher,
    router: EventRouter,
    limiter: ActivityRateLimiter,
    closed: AtomicBool,
    closing: watch::Sender<bool>,
    auth: parking_lot::RwLock<AuthInfo>,
    state: StateCell,
    events: broadcast::Sender<SessionEvent>,
    read_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Opens the transport, performs the handshake and starts the read loop.
    pub(crate) async fn establish(
        transport: &dyn Transport,
        config: SessionConfig,
        state: StateCell,
        events: broadcast::Sender<SessionEvent>,
    ) -> Result<Arc<Self>, ClientError> {
        state.set(SessionState::Connecting);
        tracing::debug!("Connecting via {}...", transport.describe());

        let stream = tokio::time::timeout(config.handshake_timeout, transport.connect())
            .await
            .map_err(|_| {
                ClientError::Connect(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "transport connect timed out",
                ))
            })??;

        state.set(SessionState::Handshaking);
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut decoder = Decoder::new();

        let negotiator = HandshakeNegotiator::new(
            &config.client_id,
            config.handshake_timeout,
            config.read_buffer_size,
        );
        let ready = negotiator
            .negotiate(&mut reader, &mut writer, &mut decoder)
            .await?;

        let conn = Arc::new(Self {
            limiter: ActivityRateLimiter::new(config.activity_interval, config.activity_policy),
            config,
            ready,
            writer: Mutex::new(Some(writer)),
            dispatcher: RequestDispatcher::new(),
            router: EventRouter::new(),
            closed: AtomicBool::new(false),
            closing: watch::channel(false).0,
            auth: parking_lot::RwLock::new(AuthInfo::default()),
            state,
            events,
            read_task: parking_lot::Mutex::new(None),
        });

        let task = tokio::spawn(Arc::clone(&conn).read_loop(reader, decoder));
        *conn.read_task.lock() = Some(task);

        tracing::info!("Connected to host via {}", transport.describe());
        Ok(conn)
    }

    /// Returns the READY data received during the handshake.
    pub fn ready(&self) -> &ReadyData {
        &self.ready
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns whether the connection has been torn down.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn auth(&self) -> AuthInfo {
        self.auth.read().clone()
    }

    /// Stores authentication results unless the connection is already gone.
    pub(crate) fn set_auth(&self, info: AuthInfo) {
        let mut auth = self.auth.write();
        if !self.is_closed() {
            *auth = info;
        }
    }

    /// Returns the number of requests waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.dispatcher.len()
    }

    /// Sends a command and waits for its response.
    pub async fn request(
        &self,
        command: &str,
        args: Value,
        evt: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Value, ClientError> {
        if self.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }

        let (nonce, rx) = self.dispatcher.register(command);
        // Held across the write so a caller dropped mid-write leaves no entry.
        let _pending = self.dispatcher.cancel_on_drop(&nonce);
        let mut request = Request::new(command, &nonce).with_args(args);
        if let Some(evt) = evt {
            request = request.with_event(evt);
        }

        let encoded = Encoder::encode_request(&request)?;
        self.write_frame(&encoded).await?;
        tracing::debug!(
            "Sent {} (nonce {}, {} bytes)",
            command,
            nonce,
            encoded.len()
        );

        self.dispatcher.wait(command, &nonce, rx, timeout).await
    }

    /// Sends a SET_ACTIVITY request through the rate limiter.
    pub async fn set_activity(self: &Arc<Self>, args: Value) -> Result<ActivityOutcome, ClientError> {
        if self.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }

        match self.limiter.admit(args) {
            Admission::Immediate(args) => self
                .request(
                    Command::SetActivity.as_str(),
                    args,
                    None,
                    Some(self.config.request_timeout),
                )
                .await
                .map(ActivityOutcome::Sent),
            Admission::Queued { rx, flush_at } => {
                if let Some(at) = flush_at {
                    self.schedule_activity_flush(at);
                }
                rx.await.unwrap_or(Err(ClientError::ConnectionClosed))
            }
            Admission::Rejected { retry_after } => Err(ClientError::RateLimited { retry_after }),
        }
    }

    fn schedule_activity_flush(self: &Arc<Self>, at: Instant) {
        tracing::debug!(
            "Activity update deferred by {:?}",
            at.saturating_duration_since(Instant::now())
        );
        let conn = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            let Some(update) = conn.limiter.take_due() else {
                return;
            };
            let result = conn
                .request(
                    Command::SetActivity.as_str(),
                    update.args,
                    None,
                    Some(conn.config.request_timeout),
                )
                .await
                .map(ActivityOutcome::Sent);
            let _ = update.tx.send(result);
        });
    }

    async fn write_frame(&self, bytes: &[u8]) -> Result<(), ClientError> {
        let mut closing = self.closing.subscribe();
        let result = {
            let mut guard = tokio::select! {
                guard = self.writer.lock() => guard,
                _ = closing.wait_for(|closed| *closed) => return Err(ClientError::ConnectionClosed),
            };
            if self.is_closed() {
                return Err(ClientError::ConnectionClosed);
            }
            let writer = guard.as_mut().ok_or(ClientError::ConnectionClosed)?;
            let write = async {
                writer.write_all(bytes).await?;
                writer.flush().await
            };
            // A stalled write gives up once the connection is torn down.
            tokio::select! {
                result = write => result,
                _ = closing.wait_for(|closed| *closed) => return Err(ClientError::ConnectionClosed),
            }
        };

        if let Err(e) = result {
            tracing::debug!("Write failed: {}", e);
            let copy = std::io::Error::new(e.kind(), e.to_string());
            self.teardown(Teardown::Failed(ClientError::Io(copy)));
            return Err(ClientError::Io(e));
        }
        Ok(())
    }

    async fn read_loop(self: Arc<Self>, mut reader: ReadHalf<TransportStream>, mut decoder: Decoder) {
        tracing::debug!("read_loop started");
        let mut buf = vec![0u8; self.config.read_buffer_size];

        let reason = 'read: loop {
            loop {
                match decoder.decode_frame() {
                    Ok(Some(frame)) => {
                        if let Some(reason) = self.handle_frame(frame).await {
                            break 'read reason;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => break 'read Teardown::Failed(e.into()),
                }
            }

            match reader.read(&mut buf).await {
                Ok(0) => break Teardown::Eof,
                Ok(n) => {
                    tracing::trace!("read_loop: received {} bytes", n);
                    decoder.extend(&buf[..n]);
                }
                Err(e) => break Teardown::Failed(ClientError::Io(e)),
            }
        };

        tracing::debug!("read_loop finished: {:?}", reason);
        self.teardown(reason);
    }

    /// Handles one inbound frame. Returns a teardown reason to stop the loop.
    async fn handle_frame(&self, frame: Frame) -> Option<Teardown> {
        match frame.opcode {
            Opcode::Frame => {
                let msg = match Message::from_value(frame.payload) {
                    Ok(msg) => msg,
                    Err(e) => return Some(Teardown::Failed(e.into())),
                };
                self.route_message(msg);
                None
            }
            Opcode::Ping => {
                tracing::debug!("PING received, sending PONG");
                match Encoder::encode_pong(&frame.payload) {
                    Ok(pong) => self.write_frame(&pong).await.err().map(Teardown::Failed),
                    Err(e) => Some(Teardown::Failed(e.into())),
                }
            }
            Opcode::Pong => {
                tracing::trace!("PONG received");
                None
            }
            Opcode::Close => {
                let err = serde_json::from_value(frame.payload).unwrap_or(RpcErrorData {
                    code: 0,
                    message: "closed by host".to_string(),
                });
                Some(Teardown::PeerClosed(err))
            }
            Opcode::Handshake => Some(Teardown::Failed(
                ProtocolError::UnexpectedOpcode(Opcode::Handshake.as_u32()).into(),
            )),
        }
    }

    fn route_message(&self, msg: Message) {
        if msg.is_dispatch() {
            let event = msg.evt.clone().unwrap_or_default();
            let report = self.router.dispatch(&event, msg.args.as_ref(), &msg.data);
            tracing::debug!("Dispatch {} delivered to {} handlers", event, report.delivered);

            for failure in &report.failures {
                let _ = self.events.send(SessionEvent::HandlerFailed {
                    event: failure.event.clone(),
                    message: failure.message.clone(),
                });
            }
            if report.delivered == 0 && report.failures.is_empty() {
                let _ = self.events.send(SessionEvent::Dispatch {
                    event,
                    data: msg.data,
                });
            }
            return;
        }

        if let Resolution::Unmatched(msg) = self.dispatcher.resolve(msg) {
            tracing::warn!(
                "Dropping response with no pending request: cmd={:?} nonce={:?}",
                msg.cmd,
                msg.nonce
            );
        }
    }

    /// Tears the connection down and sends CLOSE. Idempotent.
    ///
    /// CLOSE is skipped when another write holds the stream, and its write is
    /// bounded, so a host that stopped reading cannot stall the close.
    pub async fn close(&self) {
        if self.is_closed() {
            return;
        }

        let writer = self.writer.try_lock().ok().and_then(|mut guard| guard.take());
        self.teardown(Teardown::Local);

        let Some(mut writer) = writer else {
            tracing::debug!("Writer busy, closing without CLOSE frame");
            return;
        };
        let send_close = async {
            tracing::debug!("Sending CLOSE");
            if let Ok(bytes) = Encoder::encode_json(Opcode::Close, &json!({})) {
                writer.write_all(&bytes).await?;
            }
            writer.shutdown().await
        };
        match tokio::time::timeout(CLOSE_WRITE_TIMEOUT, send_close).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!("CLOSE not delivered: {}", e),
            Err(_) => tracing::debug!("CLOSE not delivered within {:?}", CLOSE_WRITE_TIMEOUT),
        }
    }

    /// Tears down without sending CLOSE.
    pub(crate) fn abort(&self) {
        self.teardown(Teardown::Local);
    }

    /// Resolves every pending request, clears subscriptions and reports the
    /// session closed. Runs once per connection.
    fn teardown(&self, reason: Teardown) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.closing.send_replace(true);

        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }

        let failed = self.dispatcher.fail_all(|| ClientError::ConnectionClosed);
        let cleared = self.router.clear();
        *self.auth.write() = AuthInfo::default();
        self.limiter.fail_pending(ClientError::ConnectionClosed);
        tracing::debug!(
            "Teardown failed {} pending requests, cleared {} handlers",
            failed,
            cleared
        );

        self.state.set(SessionState::Closed);

        let (code, reason) = match reason {
            Teardown::PeerClosed(err) => {
                tracing::info!("Host closed the connection: [{}] {}", err.code, err.message);
                (Some(err.code), err.message)
            }
            Teardown::Eof => {
                tracing::info!("Connection closed by host");
                (None, "connection closed".to_string())
            }
            Teardown::Failed(err) => {
                tracing::warn!("Connection failed: {}", err);
                let _ = self.events.send(SessionEvent::Error(err.to_string()));
                (None, err.to_string())
            }
            Teardown::Local => {
                tracing::info!("Connection closed");
                (None, "closed locally".to_string())
            }
        };
        let _ = self.events.send(SessionEvent::Disconnected { code, reason });

        if let Some(task) = self.read_task.lock().take() {
            task.abort();
        }
    }
}
