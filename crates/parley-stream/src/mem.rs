//! In-process transport pair.
//!
//! Two connected transports passing already-framed messages over unbounded
//! channels. No bytes, no framing — the cheapest way to wire two
//! connections together inside one process, which is exactly what the
//! engine tests and demos want.

use tokio::sync::mpsc;

use parley_session::{CancelToken, ReadTransport, Transport, WriteTransport};
use parley_wire::{ErrorCode, Message};

/// Create a connected pair. What one side writes, the other reads, in
/// order. Dropping either side's halves surfaces as
/// [`ErrorCode::CONNECTION_RESET`] on the peer.
pub fn pair() -> (MemTransport, MemTransport) {
    let (left_tx, right_rx) = mpsc::unbounded_channel();
    let (right_tx, left_rx) = mpsc::unbounded_channel();
    (
        MemTransport::new(left_tx, left_rx),
        MemTransport::new(right_tx, right_rx),
    )
}

/// One side of an in-process pair.
pub struct MemTransport {
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
    cancel: CancelToken,
}

impl MemTransport {
    fn new(tx: mpsc::UnboundedSender<Message>, rx: mpsc::UnboundedReceiver<Message>) -> Self {
        Self {
            tx,
            rx,
            cancel: CancelToken::new(),
        }
    }
}

impl Transport for MemTransport {
    type ReadHalf = MemReader;
    type WriteHalf = MemWriter;

    fn set_cancellation_token(&mut self, token: CancelToken) {
        self.cancel = token;
    }

    fn cancellation_token(&self) -> &CancelToken {
        &self.cancel
    }

    fn into_split(self) -> (Self::ReadHalf, Self::WriteHalf) {
        (
            MemReader {
                rx: self.rx,
                cancel: self.cancel.clone(),
            },
            MemWriter {
                tx: self.tx,
                cancel: self.cancel,
            },
        )
    }
}

/// Read half of a [`MemTransport`].
pub struct MemReader {
    rx: mpsc::UnboundedReceiver<Message>,
    cancel: CancelToken,
}

impl ReadTransport for MemReader {
    async fn read(&mut self) -> Result<Message, ErrorCode> {
        let cancel = self.cancel.clone();
        tokio::select! {
            _ = cancel.cancelled() => Err(ErrorCode::ABORT),
            message = self.rx.recv() => message.ok_or(ErrorCode::CONNECTION_RESET),
        }
    }
}

/// Write half of a [`MemTransport`].
pub struct MemWriter {
    tx: mpsc::UnboundedSender<Message>,
    cancel: CancelToken,
}

impl WriteTransport for MemWriter {
    async fn write(&mut self, message: Message) -> Result<(), ErrorCode> {
        if self.cancel.is_cancelled() {
            return Err(ErrorCode::ABORT);
        }
        self.tx
            .send(message)
            .map_err(|_| ErrorCode::CONNECTION_RESET)
    }
}
