//! The transport contract.
//!
//! A transport owns a duplex framed-message channel. The engine never
//! requires internal synchronization from it: [`Transport::into_split`]
//! separates the two directions, the writer task owns the write half and
//! the reader task owns the read half exclusively.
//!
//! The connection hands its [`CancelToken`] to the transport before
//! splitting; the transport must abort pending I/O once the token is
//! cancelled, otherwise `stop()` cannot make progress while the peer is
//! idle.

use std::future::Future;

use crate::cancel::CancelToken;
use crate::dispatch::BoxFuture;
use parley_wire::{ErrorCode, Message};

/// The receiving direction of a transport.
pub trait ReadTransport: Send + 'static {
    /// Yield the next inbound framed message. Hard failures surface as an
    /// [`ErrorCode`].
    fn read(&mut self) -> impl Future<Output = Result<Message, ErrorCode>> + Send;
}

/// The sending direction of a transport.
pub trait WriteTransport: Send + 'static {
    /// Frame and deliver one outbound message. Hard failures surface as an
    /// [`ErrorCode`].
    fn write(&mut self, message: Message) -> impl Future<Output = Result<(), ErrorCode>> + Send;
}

/// A duplex framed-message transport a connection can be started on.
pub trait Transport: Send + 'static {
    type ReadHalf: ReadTransport;
    type WriteHalf: WriteTransport;

    /// Attach the connection's cancellation token. Pending I/O must abort
    /// once it is cancelled.
    fn set_cancellation_token(&mut self, token: CancelToken);

    /// The currently attached token.
    fn cancellation_token(&self) -> &CancelToken;

    /// Split into independently owned halves.
    fn into_split(self) -> (Self::ReadHalf, Self::WriteHalf);
}

// ============================================================================
// Type-erased transports
// ============================================================================

trait DynReadTransport: Send {
    fn read(&mut self) -> BoxFuture<'_, Result<Message, ErrorCode>>;
}

impl<T: ReadTransport> DynReadTransport for T {
    fn read(&mut self) -> BoxFuture<'_, Result<Message, ErrorCode>> {
        Box::pin(ReadTransport::read(self))
    }
}

/// Boxed read half of a [`BoxTransport`].
pub struct BoxReadTransport(Box<dyn DynReadTransport>);

impl ReadTransport for BoxReadTransport {
    async fn read(&mut self) -> Result<Message, ErrorCode> {
        self.0.read().await
    }
}

trait DynWriteTransport: Send {
    fn write(&mut self, message: Message) -> BoxFuture<'_, Result<(), ErrorCode>>;
}

impl<T: WriteTransport> DynWriteTransport for T {
    fn write(&mut self, message: Message) -> BoxFuture<'_, Result<(), ErrorCode>> {
        Box::pin(WriteTransport::write(self, message))
    }
}

/// Boxed write half of a [`BoxTransport`].
pub struct BoxWriteTransport(Box<dyn DynWriteTransport>);

impl WriteTransport for BoxWriteTransport {
    async fn write(&mut self, message: Message) -> Result<(), ErrorCode> {
        self.0.write(message).await
    }
}

trait DynTransport: Send {
    fn set_cancellation_token(&mut self, token: CancelToken);
    fn cancellation_token(&self) -> &CancelToken;
    fn into_split_boxed(self: Box<Self>) -> (BoxReadTransport, BoxWriteTransport);
}

impl<T: Transport> DynTransport for T {
    fn set_cancellation_token(&mut self, token: CancelToken) {
        Transport::set_cancellation_token(self, token);
    }

    fn cancellation_token(&self) -> &CancelToken {
        Transport::cancellation_token(self)
    }

    fn into_split_boxed(self: Box<Self>) -> (BoxReadTransport, BoxWriteTransport) {
        let (read, write) = (*self).into_split();
        (
            BoxReadTransport(Box::new(read)),
            BoxWriteTransport(Box::new(write)),
        )
    }
}

/// A transport behind a trait object, so connections can be parameterized
/// over the transport kind at runtime.
pub struct BoxTransport(Box<dyn DynTransport>);

impl BoxTransport {
    /// Erase a concrete transport.
    pub fn new(transport: impl Transport) -> Self {
        Self(Box::new(transport))
    }
}

impl Transport for BoxTransport {
    type ReadHalf = BoxReadTransport;
    type WriteHalf = BoxWriteTransport;

    fn set_cancellation_token(&mut self, token: CancelToken) {
        self.0.set_cancellation_token(token);
    }

    fn cancellation_token(&self) -> &CancelToken {
        self.0.cancellation_token()
    }

    fn into_split(self) -> (Self::ReadHalf, Self::WriteHalf) {
        self.0.into_split_boxed()
    }
}
