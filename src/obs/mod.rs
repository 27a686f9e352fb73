//! Connection manager for the control server.
//!
//! Owns the single live websocket session and its reconnect policy.
//! All other components observe it through [`ObsHandle`]: a cheap
//! clonable handle exposing `status()`, `subscribe()`, and the typed
//! call surface. The supervisor task applies every state transition
//! from one dispatch loop, so subscribers see transitions in exact
//! order, never coalesced.

pub mod protocol;
mod session;

use crate::error::{DeckError, Result};
use arc_swap::ArcSwap;
use protocol::{ClientMessage, Request, SceneList, ServerMessage};
use serde_json::Value;
use session::WsStream;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Consecutive failed connect attempts before giving up.
pub const MAX_RETRIES: u32 = 10;

/// Default pause between retry attempts (fixed, not exponential).
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on a single connect attempt (dial + handshake).
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on a single remote call round-trip.
const CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Address and credential for the control server. Compared for
/// equality to detect settings changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub address: String,
    pub credential: String,
}

impl ConnectionParams {
    /// Both fields must be present before a connect is attempted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.address.is_empty() && !self.credential.is_empty()
    }
}

/// Connection lifecycle state. Exactly one holds at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the retry interval before attempt `n + 1`.
    Retrying(u32),
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Retrying(n) => write!(f, "retrying ({n}/{MAX_RETRIES})"),
        }
    }
}

/// Clonable handle to the connection manager task.
#[derive(Clone)]
pub struct ObsHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    status: Arc<ArcSwap<ConnectionStatus>>,
}

impl ObsHandle {
    /// Current status, non-blocking.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        **self.status.load()
    }

    /// Supply (possibly new) connection parameters.
    ///
    /// Idempotent if the parameters are unchanged and the manager is
    /// not disconnected; otherwise forces a fresh connect attempt,
    /// abandoning any in-flight attempt or pending retry timer.
    pub fn configure(&self, params: ConnectionParams) {
        let _ = self.cmd_tx.send(Command::Configure(params));
    }

    /// Close the session and cancel any pending retry.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect);
    }

    /// Receive the current status immediately, then every transition
    /// in order.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ConnectionStatus> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.cmd_tx.send(Command::Subscribe(tx));
        rx
    }

    /// Advisory one-shot connect: resolves once the manager is
    /// connected, or with the failure of a single immediate attempt.
    /// Retry scheduling stays with the manager.
    ///
    /// # Errors
    /// `DeckError::Connect` if the attempt fails or no parameters are
    /// configured.
    pub async fn connect_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ConnectNow { respond: tx })
            .map_err(|_| DeckError::NotConnected)?;
        rx.await.map_err(|_| DeckError::NotConnected)?
    }

    /// Issue a request against the live session.
    ///
    /// # Errors
    /// Fails fast with `DeckError::NotConnected` (no network I/O) when
    /// not connected; `DeckError::RemoteCall` when the server rejects
    /// the operation; `DeckError::CallTimeout` after 10s without a
    /// response.
    pub async fn call(&self, request: Request) -> Result<Value> {
        if self.status() != ConnectionStatus::Connected {
            return Err(DeckError::NotConnected);
        }
        let method = request.method();
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Call {
                request,
                respond: tx,
            })
            .map_err(|_| DeckError::NotConnected)?;

        match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Err(_) => Err(DeckError::CallTimeout {
                method: method.to_string(),
            }),
            Ok(Err(_)) => Err(DeckError::NotConnected),
            Ok(Ok(result)) => result,
        }
    }

    /// Fetch the scene list, in server order.
    ///
    /// # Errors
    /// See [`ObsHandle::call`].
    pub async fn list_scenes(&self) -> Result<Vec<String>> {
        let data = self.call(Request::ListScenes).await?;
        let list: SceneList = serde_json::from_value(data)?;
        Ok(list.into_names())
    }

    /// Switch the current scene.
    ///
    /// # Errors
    /// See [`ObsHandle::call`].
    pub async fn set_current_scene(&self, scene_name: &str) -> Result<()> {
        self.call(Request::SetCurrentScene {
            scene_name: scene_name.to_string(),
        })
        .await?;
        Ok(())
    }
}

enum Command {
    Configure(ConnectionParams),
    Disconnect,
    ConnectNow {
        respond: oneshot::Sender<Result<()>>,
    },
    Call {
        request: Request,
        respond: oneshot::Sender<Result<Value>>,
    },
    Subscribe(mpsc::UnboundedSender<ConnectionStatus>),
}

/// Internal notifications from connect and session I/O tasks. Each
/// carries the epoch of the attempt that produced it; stale epochs are
/// discarded on arrival.
enum SessionEvent {
    ConnectResult {
        epoch: u64,
        result: std::result::Result<Box<WsStream>, String>,
    },
    Incoming {
        epoch: u64,
        message: ServerMessage,
    },
    Closed {
        epoch: u64,
    },
}

/// A connect attempt in flight.
struct Attempt {
    /// Which retry rung launched it; 0 for a fresh configure.
    number: u32,
    /// Advisory one-shot from idle: a failure returns to
    /// `Disconnected` instead of entering the retry ladder.
    advisory: bool,
}

/// A scheduled retry timer while in `Retrying(attempt)`.
struct Retry {
    attempt: u32,
    deadline: Instant,
}

struct Session {
    out_tx: mpsc::UnboundedSender<ClientMessage>,
    reader: tokio::task::JoinHandle<()>,
    writer: tokio::task::JoinHandle<()>,
}

/// Supervisor task state. Constructed via [`ObsManager::spawn`].
pub struct ObsManager {
    params: Option<ConnectionParams>,
    status: Arc<ArcSwap<ConnectionStatus>>,
    subscribers: Vec<mpsc::UnboundedSender<ConnectionStatus>>,
    retry_interval: Duration,
    /// Bumped whenever the current attempt or session is abandoned.
    epoch: u64,
    attempt: Option<Attempt>,
    retry: Option<Retry>,
    session: Option<Session>,
    pending: HashMap<String, PendingCall>,
    connect_waiters: Vec<oneshot::Sender<Result<()>>>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
}

struct PendingCall {
    method: &'static str,
    respond: oneshot::Sender<Result<Value>>,
}

impl ObsManager {
    /// Spawn the supervisor task and return its handle.
    #[must_use]
    pub fn spawn(retry_interval: Duration, cancel: CancellationToken) -> ObsHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let status = Arc::new(ArcSwap::from_pointee(ConnectionStatus::Disconnected));

        let manager = ObsManager {
            params: None,
            status: Arc::clone(&status),
            subscribers: Vec::new(),
            retry_interval,
            epoch: 0,
            attempt: None,
            retry: None,
            session: None,
            pending: HashMap::new(),
            connect_waiters: Vec::new(),
            event_tx,
        };
        tokio::spawn(manager.run(cmd_rx, event_rx, cancel));

        ObsHandle { cmd_tx, status }
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut event_rx: mpsc::UnboundedReceiver<SessionEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let retry_deadline = self.retry.as_ref().map(|r| r.deadline);
            tokio::select! {
                () = cancel.cancelled() => break,
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                event = event_rx.recv() => {
                    if let Some(event) = event {
                        self.handle_session_event(event);
                    }
                },
                () = tokio::time::sleep_until(retry_deadline.unwrap_or_else(Instant::now)),
                    if retry_deadline.is_some() => self.retry_fired(),
            }
        }
        self.teardown();
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Configure(params) => self.configure(params),
            Command::Disconnect => self.explicit_disconnect(),
            Command::ConnectNow { respond } => self.connect_now(respond),
            Command::Call { request, respond } => self.call(request, respond),
            Command::Subscribe(tx) => {
                let _ = tx.send(self.current());
                self.subscribers.push(tx);
            }
        }
    }

    fn configure(&mut self, params: ConnectionParams) {
        let unchanged = self.params.as_ref() == Some(&params);
        if unchanged && self.current() != ConnectionStatus::Disconnected {
            debug!("configure: parameters unchanged, ignoring");
            return;
        }

        if !unchanged {
            info!("connection parameters changed");
        }
        self.params = Some(params.clone());
        self.abandon_in_flight();
        self.drop_session();

        if params.is_complete() {
            // Any connect_now waiters ride the fresh attempt.
            self.start_attempt(0, false);
        } else {
            self.fail_connect_waiters("connection parameters not configured");
            self.set_status(ConnectionStatus::Disconnected);
        }
    }

    fn explicit_disconnect(&mut self) {
        info!("explicit disconnect");
        self.abandon_in_flight();
        self.drop_session();
        self.fail_connect_waiters("disconnected");
        self.set_status(ConnectionStatus::Disconnected);
    }

    fn connect_now(&mut self, respond: oneshot::Sender<Result<()>>) {
        match self.current() {
            ConnectionStatus::Connected => {
                let _ = respond.send(Ok(()));
            }
            ConnectionStatus::Connecting => {
                // Ride the attempt already in flight.
                self.connect_waiters.push(respond);
            }
            status => {
                let complete = self.params.as_ref().is_some_and(ConnectionParams::is_complete);
                if !complete {
                    let _ = respond.send(Err(DeckError::Connect(
                        "connection parameters not configured".into(),
                    )));
                    return;
                }
                // From Retrying(n) this is the rung-n attempt moved
                // forward; its failure re-enters the ladder as usual.
                // From Disconnected it is advisory only.
                let (number, advisory) = match status {
                    ConnectionStatus::Retrying(n) => (n, false),
                    _ => (0, true),
                };
                self.connect_waiters.push(respond);
                self.retry = None;
                self.start_attempt(number, advisory);
            }
        }
    }

    fn call(&mut self, request: Request, respond: oneshot::Sender<Result<Value>>) {
        if self.current() != ConnectionStatus::Connected {
            let _ = respond.send(Err(DeckError::NotConnected));
            return;
        }
        let Some(session) = &self.session else {
            let _ = respond.send(Err(DeckError::NotConnected));
            return;
        };

        let request_id = uuid::Uuid::new_v4().to_string();
        let method = request.method();
        let message = ClientMessage::Request {
            request_id: request_id.clone(),
            request,
        };
        if session.out_tx.send(message).is_err() {
            let _ = respond.send(Err(DeckError::NotConnected));
            return;
        }
        self.pending
            .insert(request_id, PendingCall { method, respond });
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ConnectResult { epoch, result } => {
                if epoch != self.epoch {
                    debug!("discarding stale connect result (epoch {epoch})");
                    return;
                }
                let Some(attempt) = self.attempt.take() else {
                    return;
                };
                match result {
                    Ok(stream) => self.attempt_succeeded(*stream),
                    Err(message) => self.attempt_failed(&attempt, message),
                }
            }
            SessionEvent::Incoming { epoch, message } => {
                if epoch == self.epoch {
                    self.handle_incoming(message);
                }
            }
            SessionEvent::Closed { epoch } => {
                if epoch == self.epoch {
                    self.session_closed();
                }
            }
        }
    }

    fn attempt_succeeded(&mut self, stream: WsStream) {
        info!("connected to control server");
        self.retry = None;
        self.install_session(stream);
        self.set_status(ConnectionStatus::Connected);
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
    }

    fn attempt_failed(&mut self, attempt: &Attempt, message: String) {
        warn!("connect failed: {message}");
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(DeckError::Connect(message.clone())));
        }

        if attempt.advisory {
            self.set_status(ConnectionStatus::Disconnected);
            return;
        }

        let next = attempt.number + 1;
        if next <= MAX_RETRIES {
            self.set_status(ConnectionStatus::Retrying(next));
            self.retry = Some(Retry {
                attempt: next,
                deadline: Instant::now() + self.retry_interval,
            });
        } else {
            self.set_status(ConnectionStatus::Disconnected);
        }
    }

    fn retry_fired(&mut self) {
        let Some(retry) = self.retry.take() else {
            return;
        };
        if retry.attempt < MAX_RETRIES {
            self.start_attempt(retry.attempt, false);
        } else {
            warn!("giving up after {MAX_RETRIES} failed connect attempts");
            self.set_status(ConnectionStatus::Disconnected);
        }
    }

    /// Unexpected close of a live session: publish `Disconnected`,
    /// then immediately re-enter `Connecting` with last-known params.
    fn session_closed(&mut self) {
        warn!("control server closed the connection");
        self.drop_session();
        self.set_status(ConnectionStatus::Disconnected);
        if self.params.as_ref().is_some_and(ConnectionParams::is_complete) {
            self.start_attempt(0, false);
        }
    }

    fn handle_incoming(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Response {
                request_id,
                data,
                error,
            } => {
                let Some(call) = self.pending.remove(&request_id) else {
                    // Likely a reply to a call that already timed out.
                    debug!("response for unknown request {request_id}");
                    return;
                };
                let result = match error {
                    Some(message) => Err(DeckError::RemoteCall {
                        method: call.method.to_string(),
                        message,
                    }),
                    None => Ok(data),
                };
                let _ = call.respond.send(result);
            }
            other => debug!("unexpected server message: {other:?}"),
        }
    }

    fn start_attempt(&mut self, number: u32, advisory: bool) {
        self.epoch += 1;
        let epoch = self.epoch;
        self.attempt = Some(Attempt { number, advisory });
        self.set_status(ConnectionStatus::Connecting);

        let params = self
            .params
            .clone()
            .expect("attempt started without parameters");
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = match tokio::time::timeout(CONNECT_TIMEOUT, session::connect(&params))
                .await
            {
                Ok(Ok(stream)) => Ok(Box::new(stream)),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err("connect timed out".to_string()),
            };
            let _ = event_tx.send(SessionEvent::ConnectResult { epoch, result });
        });
    }

    fn install_session(&mut self, stream: WsStream) {
        use futures::{SinkExt, StreamExt};

        let epoch = self.epoch;
        let (mut sink, mut source) = stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientMessage>();

        let writer = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                let Ok(text) = serde_json::to_string(&message) else {
                    continue;
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        let reader_event_tx = self.event_tx.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str(text.as_str()) {
                        Ok(message) => {
                            let _ = reader_event_tx.send(SessionEvent::Incoming { epoch, message });
                        }
                        Err(e) => warn!("unparseable server message: {e}"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            let _ = reader_event_tx.send(SessionEvent::Closed { epoch });
        });

        self.session = Some(Session {
            out_tx,
            reader,
            writer,
        });
    }

    /// Abandon any in-flight attempt and pending retry; its eventual
    /// result will arrive with a stale epoch and be discarded.
    fn abandon_in_flight(&mut self) {
        self.epoch += 1;
        self.attempt = None;
        self.retry = None;
    }

    fn drop_session(&mut self) {
        if let Some(session) = self.session.take() {
            self.epoch += 1;
            session.reader.abort();
            session.writer.abort();
        }
        for (_, call) in self.pending.drain() {
            let _ = call.respond.send(Err(DeckError::NotConnected));
        }
    }

    fn fail_connect_waiters(&mut self, reason: &str) {
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(DeckError::Connect(reason.to_string())));
        }
    }

    fn current(&self) -> ConnectionStatus {
        **self.status.load()
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.current() == status {
            return;
        }
        info!("connection status: {status}");
        self.status.store(Arc::new(status));
        self.subscribers.retain(|tx| tx.send(status).is_ok());
    }

    fn teardown(&mut self) {
        self.drop_session();
        self.fail_connect_waiters("connection manager stopped");
        self.set_status(ConnectionStatus::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_completeness() {
        let params = ConnectionParams {
            address: "ws://localhost:4455".into(),
            credential: "secret".into(),
        };
        assert!(params.is_complete());
        assert!(!ConnectionParams {
            address: String::new(),
            credential: "secret".into(),
        }
        .is_complete());
    }

    #[test]
    fn status_display() {
        assert_eq!(ConnectionStatus::Connected.to_string(), "connected");
        assert_eq!(ConnectionStatus::Retrying(3).to_string(), "retrying (3/10)");
    }
}
