#![deny(unsafe_code)]

//! The parley binary serializer.
//!
//! A deterministic, schema-driven little-endian encoding for a fixed set of
//! shapes: primitives, strings, sequences, optionals, success-or-error
//! unions, tuples, tagged unions and described records. A [`Writer`] builds
//! an opaque payload; a [`Reader`] reconstructs typed values from one.
//! Interpretation is purely positional — both peers must agree on the
//! schema, which the interface declaration provides.
//!
//! Types participate through the [`Encode`] and [`Decode`] traits. A
//! hand-written impl is the custom-serialization escape hatch and always
//! takes precedence; for plain structs and enums the [`describe_record!`],
//! [`describe_enum!`] and [`describe_variant!`] macros derive the impls from
//! an explicit field or variant list.
//!
//! Readers and writers optionally carry a [`SerializerState`], an opaque
//! user context threaded through every recursive call so stateful codecs
//! (dictionary compression, interning) can work without changing the wire
//! format.

mod error;
mod impls;
mod macros;
mod reader;
mod state;
mod writer;

pub use error::DecodeError;
pub use reader::Reader;
pub use state::SerializerState;
pub use writer::Writer;

pub use parley_wire::Payload;

/// A value that can be appended to a [`Writer`].
pub trait Encode {
    fn encode(&self, writer: &mut Writer<'_>);
}

/// A value that can be reconstructed from a [`Reader`].
///
/// Decoded values are always owning: a borrowed view on the encode side
/// (`&str`, `&[T]`) comes back as its owning container (`String`, `Vec<T>`).
pub trait Decode: Sized {
    fn decode(reader: &mut Reader<'_, '_>) -> Result<Self, DecodeError>;
}
