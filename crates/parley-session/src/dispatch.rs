//! Seams between generated interface code and the connection engine.
//!
//! The `interface!` macro generates a client marshaller and a server
//! dispatcher per declared interface. The generated code stays thin by
//! funnelling through [`dispatch_unary`] and [`dispatch_void`]; the traits
//! here are what the engine composes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::connection::Connection;
use parley_codec::{Decode, Encode, Reader, SerializerState, Writer};
use parley_wire::{ErrorCode, MethodId, Payload};

/// Boxed future alias used across dispatcher seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Server side of an interface: looks a method up by id, reconstructs its
/// arguments, invokes the implementation and marshals the reply.
pub trait ServerDispatcher: Send + Sync + 'static {
    /// Compile-time property of the interface: true when every method is
    /// fire-and-forget. A connection with only such a server never writes.
    fn only_void_methods(&self) -> bool;

    /// Dispatch a request expecting a response. Unknown method ids resolve
    /// to [`ErrorCode::NOT_IMPL`].
    fn dispatch(
        &self,
        method: MethodId,
        payload: Payload,
        state: Arc<SerializerState>,
    ) -> BoxFuture<'static, Result<Payload, ErrorCode>>;

    /// Dispatch a fire-and-forget request.
    fn void_dispatch(
        &self,
        method: MethodId,
        payload: Payload,
        state: Arc<SerializerState>,
    ) -> Result<(), ErrorCode>;
}

/// Client side of an interface: a generated proxy bound to a connection.
pub trait ClientMarshaller: Sized {
    /// True when every method of the interface is fire-and-forget. A
    /// client-only connection over such an interface never reads.
    const ONLY_VOID_METHODS: bool;

    /// Bind a proxy to a connection.
    fn bind(connection: &Connection) -> Self;
}

/// One row of a dispatcher's method table: the method id with the typed
/// dispatch entry points for each call kind.
///
/// A `Request` aimed at a fire-and-forget method answers an empty payload
/// without invoking anything, and a `VoidRequest` aimed at a regular method
/// is a no-op; the generated table wires the matching no-op into the unused
/// column.
pub struct MethodTableEntry<S> {
    pub id: MethodId,
    pub run: fn(&Arc<S>, Payload, Arc<SerializerState>) -> BoxFuture<'static, Result<Payload, ErrorCode>>,
    pub run_void: fn(&Arc<S>, Payload, Arc<SerializerState>) -> Result<(), ErrorCode>,
}

/// Fails the build when an interface declares two methods whose names hash
/// to the same [`MethodId`], or no methods at all.
pub const fn assert_distinct_method_ids(ids: &[MethodId]) {
    assert!(!ids.is_empty(), "an interface must declare at least one method");
    let mut i = 0;
    while i < ids.len() {
        let mut j = i + 1;
        while j < ids.len() {
            if ids[i].raw() == ids[j].raw() {
                panic!("duplicate method id in interface");
            }
            j += 1;
        }
        i += 1;
    }
}

/// Decode a request's argument tuple, run the handler, encode its result.
///
/// Arguments decode into owning types, so the handler future may outlive
/// the inbound buffer. A payload that does not decode answers
/// [`ErrorCode::INVALID_ARG`]; a unit result encodes as an empty payload.
pub fn dispatch_unary<A, R, F, Fut>(
    payload: Payload,
    state: Arc<SerializerState>,
    handler: F,
) -> BoxFuture<'static, Result<Payload, ErrorCode>>
where
    A: Decode + Send + 'static,
    R: Encode + Send + 'static,
    F: FnOnce(A) -> Fut + Send + 'static,
    Fut: Future<Output = Result<R, ErrorCode>> + Send + 'static,
{
    Box::pin(async move {
        let args = {
            let mut reader = Reader::with_state(&payload, &state);
            reader.read::<A>().map_err(|error| {
                debug!(%error, "request payload failed to decode");
                ErrorCode::INVALID_ARG
            })?
        };
        let result = handler(args).await?;
        let mut writer = Writer::with_state(&state);
        writer.write(&result);
        Ok(writer.into_payload())
    })
}

/// Decode a fire-and-forget request's argument tuple and run the handler.
pub fn dispatch_void<A, F>(
    payload: Payload,
    state: Arc<SerializerState>,
    handler: F,
) -> Result<(), ErrorCode>
where
    A: Decode,
    F: FnOnce(A),
{
    let args = {
        let mut reader = Reader::with_state(&payload, &state);
        reader.read::<A>().map_err(|error| {
            debug!(%error, "fire-and-forget payload failed to decode");
            ErrorCode::INVALID_ARG
        })?
    };
    handler(args);
    Ok(())
}
