/// Error reconstructing a value from a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload ended before the value did.
    UnexpectedEof {
        /// Bytes the current read needed.
        needed: usize,
        /// Bytes left in the span.
        available: usize,
    },
    /// A boolean byte was neither 0 nor 1.
    InvalidBool(u8),
    /// A tagged union carried an alternative index with no alternative.
    UnknownVariant {
        /// The offending tag.
        tag: u16,
    },
    /// An enumeration value matched no declared variant.
    InvalidEnum {
        /// The offending raw value.
        raw: i64,
    },
    /// String bytes were not valid UTF-8.
    InvalidUtf8,
    /// A timestamp was outside the representable range.
    InvalidTimestamp(i64),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::UnexpectedEof { needed, available } => {
                write!(f, "unexpected end of payload: needed {needed} bytes, {available} left")
            }
            DecodeError::InvalidBool(b) => write!(f, "invalid boolean byte: {b:#04x}"),
            DecodeError::UnknownVariant { tag } => write!(f, "unknown variant tag: {tag}"),
            DecodeError::InvalidEnum { raw } => write!(f, "invalid enumeration value: {raw}"),
            DecodeError::InvalidUtf8 => write!(f, "string bytes are not valid UTF-8"),
            DecodeError::InvalidTimestamp(secs) => write!(f, "timestamp out of range: {secs}"),
        }
    }
}

impl std::error::Error for DecodeError {}
