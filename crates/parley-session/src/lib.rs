#![deny(unsafe_code)]

//! Connection engine and interface binding for the parley RPC runtime.
//!
//! A [`Connection`] multiplexes outstanding calls over one transport:
//! concurrent reader and writer tasks, a pending-call table correlating
//! responses by call id, per-request dispatch tasks, latched error
//! delivery, and cooperative shutdown. The [`interface!`] macro binds a
//! declared method list into a typed client proxy and a server dispatcher
//! the connection composes.
//!
//! ```ignore
//! parley_session::interface! {
//!     pub trait Calculator;
//!     pub client CalculatorClient;
//!     pub dispatcher CalculatorDispatcher;
//!     methods {
//!         async fn simple_sum(a: i32, b: i32) -> i32;
//!         fn send_telemetry_event(event: String);
//!     }
//! }
//!
//! // Server side.
//! let server = Connection::builder()
//!     .server(CalculatorDispatcher::new(my_service))
//!     .build()?;
//! server.start(transport_a);
//!
//! // Client side.
//! let connection = Connection::builder().client::<CalculatorClient>().build()?;
//! connection.start(transport_b);
//! let calculator: CalculatorClient = connection.client();
//! assert_eq!(calculator.simple_sum(17, 42).await?, 59);
//! ```

mod cancel;
mod connection;
mod dispatch;
mod errors;
mod service;
mod transport;

pub use cancel::CancelToken;
pub use connection::{Connection, ConnectionBuilder};
pub use dispatch::{
    assert_distinct_method_ids, dispatch_unary, dispatch_void, BoxFuture, ClientMarshaller,
    MethodTableEntry, ServerDispatcher,
};
pub use errors::{BuildError, CallError, ErrorPhase};
pub use transport::{
    BoxReadTransport, BoxTransport, BoxWriteTransport, ReadTransport, Transport, WriteTransport,
};

// Re-exported so generated interface code (and its callers) resolve
// everything through this crate.
pub use parley_codec::{
    Decode, DecodeError, Encode, Payload, Reader, SerializerState, Writer,
};
pub use parley_wire::{CallType, ErrorCode, Message, MessageHeader, MethodId};
