use crate::{Encode, SerializerState};
use parley_wire::Payload;

/// Append-only payload builder.
///
/// Values go in through [`write`](Writer::write) (chainable, mirroring the
/// positional layout the peer's reader expects) and the finished byte
/// sequence comes out by move through [`into_payload`](Writer::into_payload).
/// A writer can be created on top of a previously allocated buffer to reuse
/// its capacity.
pub struct Writer<'s> {
    storage: Vec<u8>,
    state: Option<&'s SerializerState>,
}

impl Writer<'static> {
    /// Create an empty writer with no serializer state.
    pub fn new() -> Self {
        Self {
            storage: Vec::new(),
            state: None,
        }
    }

    /// Create a writer reusing `storage`'s allocation. Existing bytes are
    /// kept and appended to.
    pub fn on(storage: Vec<u8>) -> Self {
        Self {
            storage,
            state: None,
        }
    }
}

impl Default for Writer<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'s> Writer<'s> {
    /// Create an empty writer carrying a serializer state.
    pub fn with_state(state: &'s SerializerState) -> Self {
        Self {
            storage: Vec::new(),
            state: Some(state),
        }
    }

    /// Create a writer on an existing buffer, carrying a serializer state.
    pub fn on_with_state(storage: Vec<u8>, state: &'s SerializerState) -> Self {
        Self {
            storage,
            state: Some(state),
        }
    }

    /// The serializer state, if one was attached.
    pub fn state(&self) -> Option<&'s SerializerState> {
        self.state
    }

    /// Append a value's encoding.
    pub fn write<T: Encode + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.encode(self);
        self
    }

    /// Append raw bytes verbatim.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.storage.extend_from_slice(bytes);
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Take the built payload by move.
    pub fn into_payload(self) -> Payload {
        self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chained_writes_append_in_order() {
        let mut w = Writer::new();
        w.write(&1u8).write(&2u8).write(&3u8);
        assert_eq!(w.into_payload(), vec![1, 2, 3]);
    }

    #[test]
    fn reuses_existing_buffer() {
        let mut buf = Vec::with_capacity(64);
        buf.push(0xEE);
        let capacity = buf.capacity();

        let mut w = Writer::on(buf);
        w.write(&0x01u8);
        let payload = w.into_payload();
        assert_eq!(payload, vec![0xEE, 0x01]);
        assert_eq!(payload.capacity(), capacity);
    }

    #[test]
    fn empty_writer_yields_empty_payload() {
        let w = Writer::new();
        assert!(w.is_empty());
        assert!(w.into_payload().is_empty());
    }
}
