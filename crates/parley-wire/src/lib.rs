#![deny(unsafe_code)]

//! Wire-level types shared by every parley crate.
//!
//! This crate defines the message vocabulary of a connection: method
//! identifiers, call types, the packed message header, whole messages, the
//! byte-stream framing helpers, and the engine's 32-bit error codes.
//!
//! Everything on the wire is little-endian.

/// An opaque payload: the schema-defined byte sequence carrying a method's
/// arguments or its result.
pub type Payload = Vec<u8>;

// ============================================================================
// Method identifiers
// ============================================================================

/// Identifies an RPC method: the FNV-1a hash of the method's declared name.
///
/// Stable across builds of the same interface, so both peers derive the same
/// id from the shared declaration. Within one interface all ids must be
/// distinct; the `interface!` macro checks this at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct MethodId(pub u32);

impl MethodId {
    /// Create a method id from a raw value.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Hash a method name with 32-bit FNV-1a.
    ///
    /// Offset basis 2166136261, prime 16777619, each byte of the name folded
    /// in as an 8-bit value.
    pub const fn from_name(name: &str) -> Self {
        const PRIME: u32 = 16_777_619;

        let bytes = name.as_bytes();
        let mut hash: u32 = 2_166_136_261;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u32;
            hash = hash.wrapping_mul(PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// Get the raw u32 value.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for MethodId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "method:{:08x}", self.0)
    }
}

// ============================================================================
// Call types and the message header
// ============================================================================

/// Number of bits of a message header word carrying the call id.
pub const CALL_ID_BITS: u32 = 30;

/// Mask selecting the call-id bits of a header word.
pub const CALL_ID_MASK: u32 = (1 << CALL_ID_BITS) - 1;

/// The 2-bit message kind stored in the top bits of the header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CallType {
    /// A request expecting a response.
    Request = 0,
    /// A fire-and-forget request; never answered, even on dispatch error.
    VoidRequest = 1,
    /// A successful response; the payload is the marshaled result.
    Response = 2,
    /// A failed response; the payload is exactly four bytes of [`ErrorCode`].
    ResponseError = 3,
}

impl CallType {
    const fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => CallType::Request,
            1 => CallType::VoidRequest,
            2 => CallType::Response,
            _ => CallType::ResponseError,
        }
    }

    /// Whether this is a response kind (either success or error).
    pub const fn is_response(self) -> bool {
        matches!(self, CallType::Response | CallType::ResponseError)
    }
}

/// The fixed per-message header: a packed word holding the call id and call
/// type, followed by the method id. Eight bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Caller-assigned correlation id, 30 bits.
    pub call_id: u32,
    /// Message kind.
    pub call_type: CallType,
    /// The method being called or answered.
    pub method_id: MethodId,
}

impl MessageHeader {
    /// Encoded size of a header.
    pub const WIRE_LEN: usize = 8;

    /// Create a header. The call id is masked to its 30-bit range.
    pub const fn new(call_id: u32, call_type: CallType, method_id: MethodId) -> Self {
        Self {
            call_id: call_id & CALL_ID_MASK,
            call_type,
            method_id,
        }
    }

    /// Pack into the 8-byte wire form: bits 0..29 call id, bits 30..31 call
    /// type, then the method id word.
    pub fn pack(&self) -> [u8; Self::WIRE_LEN] {
        let word = (self.call_id & CALL_ID_MASK) | ((self.call_type as u32) << CALL_ID_BITS);
        let mut out = [0u8; Self::WIRE_LEN];
        out[..4].copy_from_slice(&word.to_le_bytes());
        out[4..].copy_from_slice(&self.method_id.raw().to_le_bytes());
        out
    }

    /// Unpack from the 8-byte wire form.
    pub fn unpack(bytes: [u8; Self::WIRE_LEN]) -> Self {
        let word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let method = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Self {
            call_id: word & CALL_ID_MASK,
            call_type: CallType::from_bits(word >> CALL_ID_BITS),
            method_id: MethodId::new(method),
        }
    }
}

/// A complete message: header plus payload. Payload length is bounded only
/// by what the transport accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub payload: Payload,
}

impl Message {
    /// Create a message from its parts.
    pub fn new(header: MessageHeader, payload: Payload) -> Self {
        Self { header, payload }
    }
}

// ============================================================================
// Byte-stream framing
// ============================================================================

/// Size of the framing prefix a byte-stream transport puts before the
/// payload: the 8-byte header plus a u32 payload length.
pub const FRAME_PREFIX_LEN: usize = MessageHeader::WIRE_LEN + 4;

/// Append the framed form of `message` to `out`.
pub fn encode_frame(message: &Message, out: &mut Vec<u8>) {
    out.extend_from_slice(&message.header.pack());
    out.extend_from_slice(&(message.payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&message.payload);
}

/// Try to extract one complete message from the front of `buf`.
///
/// Returns the message and the number of bytes it occupied, or `None` if the
/// buffer does not yet hold a complete frame.
pub fn decode_frame(buf: &[u8]) -> Option<(Message, usize)> {
    if buf.len() < FRAME_PREFIX_LEN {
        return None;
    }
    let mut header_bytes = [0u8; MessageHeader::WIRE_LEN];
    header_bytes.copy_from_slice(&buf[..MessageHeader::WIRE_LEN]);
    let header = MessageHeader::unpack(header_bytes);

    let len = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]) as usize;
    let total = FRAME_PREFIX_LEN + len;
    if buf.len() < total {
        return None;
    }
    let payload = buf[FRAME_PREFIX_LEN..total].to_vec();
    Some((Message::new(header, payload), total))
}

// ============================================================================
// Error codes
// ============================================================================

/// A 32-bit error code following the HRESULT convention: the high bit set
/// marks failure.
///
/// These codes travel in `ResponseError` payloads and through the
/// connection's error handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    /// Success.
    pub const OK: Self = Self(0);
    /// Unspecified failure (`E_FAIL`).
    pub const FAIL: Self = Self(0x8000_4005_u32 as i32);
    /// Operation aborted (`E_ABORT`); reported by `stop()`.
    pub const ABORT: Self = Self(0x8000_4004_u32 as i32);
    /// Method not implemented (`E_NOTIMPL`); the dispatcher's answer for an
    /// unknown method id.
    pub const NOT_IMPL: Self = Self(0x8000_4001_u32 as i32);
    /// Invalid argument (`E_INVALIDARG`); also the answer when a request
    /// arrives on a connection with no server, or its payload fails to
    /// decode.
    pub const INVALID_ARG: Self = Self(0x8007_0057_u32 as i32);
    /// Operation cancelled (`HRESULT` of `ERROR_CANCELLED`).
    pub const CANCELLED: Self = Self(0x8007_04C7_u32 as i32);
    /// Peer closed the transport (`HRESULT` of `WSAECONNRESET`).
    pub const CONNECTION_RESET: Self = Self(0x8007_2746_u32 as i32);

    /// Create a code from a raw value.
    pub const fn new(code: i32) -> Self {
        Self(code)
    }

    /// Get the raw i32 value.
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Whether the code denotes failure.
    pub const fn is_failure(self) -> bool {
        self.0 < 0
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08X}", self.0 as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_known_vectors() {
        // Standard 32-bit FNV-1a test vectors.
        assert_eq!(MethodId::from_name("").raw(), 0x811c_9dc5);
        assert_eq!(MethodId::from_name("a").raw(), 0xe40c_292c);
        assert_eq!(MethodId::from_name("foobar").raw(), 0xbf9c_f968);
    }

    #[test]
    fn method_ids_are_ordered_by_value() {
        let a = MethodId::new(1);
        let b = MethodId::new(2);
        assert!(a < b);
        assert_eq!(a, MethodId::new(1));
    }

    #[test]
    fn call_types_split_into_requests_and_responses() {
        assert!(!CallType::Request.is_response());
        assert!(!CallType::VoidRequest.is_response());
        assert!(CallType::Response.is_response());
        assert!(CallType::ResponseError.is_response());
    }

    #[test]
    fn header_packs_call_id_and_type_into_one_word() {
        let header = MessageHeader::new(
            0x1234_5678 & CALL_ID_MASK,
            CallType::ResponseError,
            MethodId::new(0xdead_beef),
        );
        let bytes = header.pack();

        let word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(word & CALL_ID_MASK, 0x1234_5678 & CALL_ID_MASK);
        assert_eq!(word >> 30, 3);
        assert_eq!(
            u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            0xdead_beef
        );

        assert_eq!(MessageHeader::unpack(bytes), header);
    }

    #[test]
    fn header_masks_call_id_to_thirty_bits() {
        let header = MessageHeader::new(u32::MAX, CallType::Request, MethodId::new(7));
        assert_eq!(header.call_id, CALL_ID_MASK);
        let round = MessageHeader::unpack(header.pack());
        assert_eq!(round.call_id, CALL_ID_MASK);
        assert_eq!(round.call_type, CallType::Request);
    }

    #[test]
    fn frame_roundtrip() {
        let message = Message::new(
            MessageHeader::new(42, CallType::Request, MethodId::from_name("sum")),
            vec![1, 2, 3, 4, 5],
        );
        let mut buf = Vec::new();
        encode_frame(&message, &mut buf);
        assert_eq!(buf.len(), FRAME_PREFIX_LEN + 5);

        let (decoded, consumed) = decode_frame(&buf).expect("complete frame");
        assert_eq!(decoded, message);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn decode_frame_waits_for_complete_payload() {
        let message = Message::new(
            MessageHeader::new(1, CallType::Response, MethodId::new(9)),
            vec![0xAA; 32],
        );
        let mut buf = Vec::new();
        encode_frame(&message, &mut buf);

        for cut in 0..buf.len() {
            assert!(decode_frame(&buf[..cut]).is_none(), "cut at {cut}");
        }
        assert!(decode_frame(&buf).is_some());
    }

    #[test]
    fn decode_frame_leaves_trailing_bytes() {
        let message = Message::new(
            MessageHeader::new(2, CallType::VoidRequest, MethodId::new(3)),
            vec![7, 7],
        );
        let mut buf = Vec::new();
        encode_frame(&message, &mut buf);
        let frame_len = buf.len();
        buf.extend_from_slice(&[0xFF; 10]);

        let (decoded, consumed) = decode_frame(&buf).expect("complete frame");
        assert_eq!(decoded, message);
        assert_eq!(consumed, frame_len);
    }

    #[test]
    fn error_codes_follow_hresult_convention() {
        assert!(!ErrorCode::OK.is_failure());
        assert!(ErrorCode::FAIL.is_failure());
        assert!(ErrorCode::ABORT.is_failure());
        assert!(ErrorCode::NOT_IMPL.is_failure());
        assert_eq!(ErrorCode::FAIL.to_string(), "0x80004005");
    }
}
