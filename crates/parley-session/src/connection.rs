//! The per-transport connection engine.
//!
//! A [`Connection`] owns a transport for the duration of one lifecycle and
//! multiplexes outstanding calls over it: a writer task drains the write
//! queue, a reader task correlates responses to pending calls by call id and
//! spawns a task per inbound request. Cancellation fans out through a
//! [`CancelToken`] shared with both tasks and the transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::cancel::CancelToken;
use crate::dispatch::{ClientMarshaller, ServerDispatcher};
use crate::errors::{BuildError, CallError, ErrorPhase};
use crate::transport::{ReadTransport, Transport, WriteTransport};
use parley_codec::{Reader, SerializerState, Writer};
use parley_wire::{CallType, ErrorCode, Message, MessageHeader, MethodId, Payload, CALL_ID_MASK};

// ============================================================================
// Shared engine state
// ============================================================================

enum CallReply {
    Payload(Payload),
    Error(ErrorCode),
}

type CompletionSlot = oneshot::Sender<CallReply>;
type ErrorHandler = Box<dyn FnOnce(ErrorCode, ErrorPhase) + Send>;

#[derive(Default)]
struct ErrorSlot {
    handler: Option<ErrorHandler>,
    latched: Option<(ErrorCode, ErrorPhase)>,
}

/// State shared with the reader and writer tasks. Lives as long as the
/// longest-running task, independently of the `Connection` handles.
struct Core {
    server: Option<Arc<dyn ServerDispatcher>>,
    state: Arc<SerializerState>,
    pending: Mutex<HashMap<u32, CompletionSlot>>,
    errors: Mutex<ErrorSlot>,
}

impl Core {
    /// Route an engine error: hand it to the installed handler on a
    /// background task, or latch it for a handler installed later. Only the
    /// first error of a lifecycle is kept.
    fn report_error(&self, code: ErrorCode, phase: ErrorPhase) {
        let handler = {
            let mut errors = self.errors.lock().unwrap();
            match errors.handler.take() {
                Some(handler) => Some(handler),
                None => {
                    if errors.latched.is_none() {
                        errors.latched = Some((code, phase));
                    }
                    None
                }
            }
        };
        if let Some(handler) = handler {
            tokio::spawn(async move { handler(code, phase) });
        }
    }

    /// Resolve the pending call a response answers. The table entry is
    /// removed before the slot is fulfilled; a response with no entry is
    /// dropped.
    fn complete_call(&self, message: Message) {
        let slot = self.pending.lock().unwrap().remove(&message.header.call_id);
        let Some(slot) = slot else {
            trace!(call_id = message.header.call_id, "response with no pending call");
            return;
        };

        if message.header.call_type == CallType::ResponseError {
            let code = if message.payload.len() == 4 {
                let mut reader = Reader::with_state(&message.payload, &self.state);
                reader.read::<ErrorCode>().unwrap_or(ErrorCode::FAIL)
            } else {
                ErrorCode::FAIL
            };
            let _ = slot.send(CallReply::Error(code));
        } else {
            let _ = slot.send(CallReply::Payload(message.payload));
        }
    }
}

#[derive(Default)]
struct Tasks {
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

struct Shared {
    core: Arc<Core>,
    /// `Some(only_void)` when a client marshaller is configured.
    client_only_void: Option<bool>,
    /// Current lifecycle's token; replaced by `stop()`.
    cancel: Mutex<CancelToken>,
    /// Current lifecycle's write queue, if a writer is armed.
    write_tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    next_call_id: AtomicU32,
    running: AtomicBool,
    /// Serializes `stop()` against itself.
    stop_gate: tokio::sync::Mutex<()>,
    tasks: Mutex<Tasks>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Last handle gone: cancel the lifecycle and abort the tasks. The
        // graceful path is `stop().await`.
        if let Ok(cancel) = self.cancel.get_mut() {
            cancel.cancel();
        }
        if let Ok(tasks) = self.tasks.get_mut() {
            if let Some(handle) = tasks.reader.take() {
                handle.abort();
            }
            if let Some(handle) = tasks.writer.take() {
                handle.abort();
            }
        }
        if let Ok(mut pending) = self.core.pending.lock() {
            pending.clear();
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A transport-agnostic RPC connection.
///
/// Constructed idle via [`Connection::builder`], transitioned to running by
/// [`start`](Connection::start) and back by [`stop`](Connection::stop)
/// (idempotent; a stopped connection may be started again on a fresh
/// transport). Cloning is cheap and every clone drives the same connection.
///
/// Dropping the last clone cancels the lifecycle and aborts the tasks
/// without waiting; call `stop().await` to quiesce gracefully.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

impl Connection {
    /// Start assembling a connection.
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::default()
    }

    /// The serializer state threaded through every marshalling operation on
    /// this connection.
    pub fn serializer_state(&self) -> &Arc<SerializerState> {
        &self.shared.core.state
    }

    /// Whether the connection is between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    fn current_cancel(&self) -> CancelToken {
        self.shared.cancel.lock().unwrap().clone()
    }

    fn enqueue(&self, message: Message) -> bool {
        let tx = self.shared.write_tx.lock().unwrap().clone();
        match tx {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Take ownership of a transport and arm the reader and writer tasks.
    ///
    /// Returns immediately; all I/O happens on spawned tasks. Must be called
    /// from within a tokio runtime.
    ///
    /// A task is only armed where the configuration can need it: with no
    /// server and a fire-and-forget-only client there is nothing to read,
    /// and with no client and a fire-and-forget-only server there is nothing
    /// to write.
    ///
    /// # Panics
    ///
    /// Panics if the connection is already running.
    pub fn start<T: Transport>(&self, mut transport: T) {
        let mut tasks = self.shared.tasks.lock().unwrap();
        assert!(!self.is_running(), "connection is already running");

        let cancel = self.current_cancel();
        transport.set_cancellation_token(cancel.clone());
        let (read_half, write_half) = transport.into_split();

        let has_server = self.shared.core.server.is_some();
        let server_only_void = self
            .shared
            .core
            .server
            .as_ref()
            .map(|server| server.only_void_methods())
            .unwrap_or(false);
        let reader_not_required = !has_server && self.shared.client_only_void == Some(true);
        let writer_not_required = self.shared.client_only_void.is_none() && server_only_void;

        let write_tx = if writer_not_required {
            None
        } else {
            let (tx, rx) = mpsc::unbounded_channel();
            tasks.writer = Some(tokio::spawn(writer_task(
                self.shared.core.clone(),
                write_half,
                rx,
                cancel.clone(),
            )));
            Some(tx)
        };
        *self.shared.write_tx.lock().unwrap() = write_tx.clone();

        if !reader_not_required {
            tasks.reader = Some(tokio::spawn(reader_task(
                self.shared.core.clone(),
                read_half,
                write_tx,
                cancel,
            )));
        }

        self.shared.running.store(true, Ordering::Release);
        debug!(reader = !reader_not_required, writer = !writer_not_required, "connection started");
    }

    /// Stop the connection.
    ///
    /// Reports [`ErrorCode::ABORT`] with phase [`ErrorPhase::Stop`], cancels
    /// the lifecycle (failing all new submissions), waits for the reader and
    /// writer tasks — and therefore every in-flight server handler — to
    /// finish, aborts every outstanding call, releases the transport and
    /// leaves the connection ready for a new `start`.
    ///
    /// Idempotent: stopping a stopped connection is a no-op.
    pub async fn stop(&self) {
        let _gate = self.shared.stop_gate.lock().await;
        if !self.is_running() {
            return;
        }
        debug!("stopping connection");

        self.shared.core.report_error(ErrorCode::ABORT, ErrorPhase::Stop);
        self.current_cancel().cancel();

        let (reader, writer) = {
            let mut tasks = self.shared.tasks.lock().unwrap();
            (tasks.reader.take(), tasks.writer.take())
        };
        if let Some(handle) = writer {
            let _ = handle.await;
        }
        if let Some(handle) = reader {
            let _ = handle.await;
        }

        // Abort every outstanding call: dropping a completion slot resolves
        // its awaiter with `CallError::Cancelled`.
        self.shared.core.pending.lock().unwrap().clear();
        *self.shared.write_tx.lock().unwrap() = None;
        self.shared.running.store(false, Ordering::Release);
        // Fresh token for the next lifecycle, installed last so a racing
        // submission still observes either `running == false` or the
        // cancelled token.
        *self.shared.cancel.lock().unwrap() = CancelToken::new();
        debug!("connection stopped");
    }

    /// Install the error handler.
    ///
    /// One handler per lifecycle: it is consumed by the first engine error
    /// (`Send`/`Receive` transport failures, `Stop`). If an error was
    /// already captured, the handler is invoked immediately on the calling
    /// thread and the latch is cleared.
    pub fn on_error(&self, handler: impl FnOnce(ErrorCode, ErrorPhase) + Send + 'static) {
        let mut errors = self.shared.core.errors.lock().unwrap();
        if let Some((code, phase)) = errors.latched.take() {
            drop(errors);
            handler(code, phase);
        } else {
            errors.handler = Some(Box::new(handler));
        }
    }

    /// Remove the error handler without installing a new one.
    pub fn clear_error_handler(&self) {
        self.shared.core.errors.lock().unwrap().handler = None;
    }

    /// Submit a request and await its response payload.
    ///
    /// Call ids are drawn from a per-connection counter wrapping modulo
    /// 2³⁰. A connection that accumulates 2³⁰ calls while the oldest is
    /// still pending would alias ids; that ceiling is a documented limit of
    /// the wire format.
    pub async fn call(&self, method: MethodId, payload: Payload) -> Result<Payload, CallError> {
        let cancel = self.current_cancel();
        if !self.is_running() || cancel.is_cancelled() {
            return Err(CallError::Cancelled);
        }

        let call_id = self.shared.next_call_id.fetch_add(1, Ordering::Relaxed) & CALL_ID_MASK;
        let (slot_tx, slot_rx) = oneshot::channel();
        {
            let mut pending = self.shared.core.pending.lock().unwrap();
            // `stop()` drains this table after cancelling; re-checking under
            // the lock keeps a racing submission from stranding its slot.
            if cancel.is_cancelled() {
                return Err(CallError::Cancelled);
            }
            pending.insert(call_id, slot_tx);
        }

        let header = MessageHeader::new(call_id, CallType::Request, method);
        if !self.enqueue(Message::new(header, payload)) {
            self.shared.core.pending.lock().unwrap().remove(&call_id);
            return Err(CallError::Cancelled);
        }
        trace!(call_id, %method, "call submitted");

        match slot_rx.await {
            Ok(CallReply::Payload(payload)) => Ok(payload),
            Ok(CallReply::Error(code)) => Err(CallError::Remote(code)),
            Err(_) => Err(CallError::Cancelled),
        }
    }

    /// Submit a fire-and-forget request. Returns once the message is
    /// queued; no response will ever arrive for it.
    pub fn post(&self, method: MethodId, payload: Payload) -> Result<(), CallError> {
        let cancel = self.current_cancel();
        if !self.is_running() || cancel.is_cancelled() {
            return Err(CallError::Cancelled);
        }

        let call_id = self.shared.next_call_id.fetch_add(1, Ordering::Relaxed) & CALL_ID_MASK;
        let header = MessageHeader::new(call_id, CallType::VoidRequest, method);
        if self.enqueue(Message::new(header, payload)) {
            trace!(call_id, %method, "fire-and-forget submitted");
            Ok(())
        } else {
            Err(CallError::Cancelled)
        }
    }

    /// Bind a generated client proxy to this connection.
    pub fn client<C: ClientMarshaller>(&self) -> C {
        C::bind(self)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles a [`Connection`] from its marshaller roles.
///
/// At most one client marshaller and at most one server dispatcher; at
/// least one of the two.
#[derive(Default)]
pub struct ConnectionBuilder {
    server: Option<Arc<dyn ServerDispatcher>>,
    client_only_void: Option<bool>,
    state: SerializerState,
}

impl ConnectionBuilder {
    /// Declare the client interface this connection will call.
    pub fn client<C: ClientMarshaller>(mut self) -> Self {
        self.client_only_void = Some(C::ONLY_VOID_METHODS);
        self
    }

    /// Attach the server dispatcher handling inbound requests.
    pub fn server(mut self, dispatcher: impl ServerDispatcher) -> Self {
        self.server = Some(Arc::new(dispatcher));
        self
    }

    /// Attach a serializer state threaded through every marshalling
    /// operation.
    pub fn serializer_state(mut self, state: SerializerState) -> Self {
        self.state = state;
        self
    }

    /// Build the connection, idle.
    pub fn build(self) -> Result<Connection, BuildError> {
        if self.server.is_none() && self.client_only_void.is_none() {
            return Err(BuildError::NoMarshaller);
        }
        Ok(Connection {
            shared: Arc::new(Shared {
                core: Arc::new(Core {
                    server: self.server,
                    state: Arc::new(self.state),
                    pending: Mutex::new(HashMap::new()),
                    errors: Mutex::new(ErrorSlot::default()),
                }),
                client_only_void: self.client_only_void,
                cancel: Mutex::new(CancelToken::new()),
                write_tx: Mutex::new(None),
                next_call_id: AtomicU32::new(0),
                running: AtomicBool::new(false),
                stop_gate: tokio::sync::Mutex::new(()),
                tasks: Mutex::new(Tasks::default()),
            }),
        })
    }
}

// ============================================================================
// Reader / writer tasks
// ============================================================================

/// Tracks in-flight server request tasks so the reader can quiesce.
///
/// Starts at one for the reader's own slot; the reader releases it on exit
/// and then waits for the count to drain to zero.
struct Quiesce {
    outstanding: AtomicI64,
    drained: Notify,
}

impl Quiesce {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            outstanding: AtomicI64::new(1),
            drained: Notify::new(),
        })
    }

    fn acquire(self: &Arc<Self>) -> QuiesceGuard {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        QuiesceGuard(self.clone())
    }

    fn release(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }

    async fn wait(&self) {
        loop {
            if self.outstanding.load(Ordering::Acquire) == 0 {
                return;
            }
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.outstanding.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct QuiesceGuard(Arc<Quiesce>);

impl Drop for QuiesceGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

async fn writer_task<W: WriteTransport>(
    core: Arc<Core>,
    mut write_half: W,
    mut queue: mpsc::UnboundedReceiver<Message>,
    cancel: CancelToken,
) {
    debug!("writer task started");
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = queue.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        if let Err(code) = write_half.write(message).await {
            warn!(%code, "transport write failed");
            cancel.cancel();
            core.report_error(code, ErrorPhase::Send);
            break;
        }
    }
    debug!("writer task exited");
}

async fn reader_task<R: ReadTransport>(
    core: Arc<Core>,
    mut read_half: R,
    write_tx: Option<mpsc::UnboundedSender<Message>>,
    cancel: CancelToken,
) {
    debug!("reader task started");
    let quiesce = Quiesce::new();

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            result = read_half.read() => match result {
                Ok(message) => message,
                Err(code) => {
                    warn!(%code, "transport read failed");
                    cancel.cancel();
                    core.report_error(code, ErrorPhase::Receive);
                    break;
                }
            },
        };

        match message.header.call_type {
            CallType::Response | CallType::ResponseError => core.complete_call(message),
            CallType::VoidRequest => {
                // Fire-and-forget dispatches inline, preserving arrival
                // order; it never elicits a response and dispatch errors
                // are swallowed.
                if let Some(server) = &core.server {
                    if let Err(code) = server.void_dispatch(
                        message.header.method_id,
                        message.payload,
                        core.state.clone(),
                    ) {
                        debug!(method = %message.header.method_id, %code, "fire-and-forget dispatch failed");
                    }
                }
            }
            CallType::Request => {
                // The counter must move before the task is spawned so a
                // reader heading for exit cannot miss it.
                let guard = quiesce.acquire();
                tokio::spawn(execute_request(
                    core.clone(),
                    message,
                    write_tx.clone(),
                    cancel.clone(),
                    guard,
                ));
            }
        }
    }

    // The reader must not return while request tasks it spawned are still
    // running; their handlers borrow nothing, but their responses do go
    // through state torn down after this point.
    quiesce.release();
    quiesce.wait().await;
    debug!("reader task exited");
}

async fn execute_request(
    core: Arc<Core>,
    message: Message,
    write_tx: Option<mpsc::UnboundedSender<Message>>,
    cancel: CancelToken,
    _guard: QuiesceGuard,
) {
    let header = message.header;

    let outcome = match &core.server {
        Some(server) => tokio::select! {
            _ = cancel.cancelled() => Err(ErrorCode::CANCELLED),
            result = server.dispatch(header.method_id, message.payload, core.state.clone()) => result,
        },
        None => Err(ErrorCode::INVALID_ARG),
    };

    // A request dispatched into a cancelled connection gets no response.
    if cancel.is_cancelled() {
        return;
    }

    let response = match outcome {
        Ok(payload) => Message::new(
            MessageHeader::new(header.call_id, CallType::Response, header.method_id),
            payload,
        ),
        Err(code) => {
            let mut writer = Writer::with_state(&core.state);
            writer.write(&code);
            Message::new(
                MessageHeader::new(header.call_id, CallType::ResponseError, header.method_id),
                writer.into_payload(),
            )
        }
    };
    if let Some(tx) = &write_tx {
        let _ = tx.send(response);
    }
}
