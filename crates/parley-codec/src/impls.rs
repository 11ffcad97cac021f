//! `Encode`/`Decode` impls for the built-in shapes.

use std::mem::size_of;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::{Decode, DecodeError, Encode, Reader, Writer};
use parley_wire::ErrorCode;

// ============================================================================
// Primitives
// ============================================================================

macro_rules! impl_codec_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn encode(&self, writer: &mut Writer<'_>) {
                    writer.put_bytes(&self.to_le_bytes());
                }
            }

            impl Decode for $ty {
                fn decode(reader: &mut Reader<'_, '_>) -> Result<Self, DecodeError> {
                    let bytes = reader.take_bytes(size_of::<$ty>())?;
                    let mut raw = [0u8; size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    Ok(<$ty>::from_le_bytes(raw))
                }
            }
        )*
    };
}

impl_codec_primitive!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Encode for bool {
    fn encode(&self, writer: &mut Writer<'_>) {
        writer.put_bytes(&[*self as u8]);
    }
}

impl Decode for bool {
    fn decode(reader: &mut Reader<'_, '_>) -> Result<Self, DecodeError> {
        match reader.take_bytes(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidBool(other)),
        }
    }
}

impl Encode for () {
    fn encode(&self, _writer: &mut Writer<'_>) {}
}

impl Decode for () {
    fn decode(_reader: &mut Reader<'_, '_>) -> Result<Self, DecodeError> {
        Ok(())
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self, writer: &mut Writer<'_>) {
        (**self).encode(writer);
    }
}

// ============================================================================
// Strings and sequences
// ============================================================================

impl Encode for str {
    fn encode(&self, writer: &mut Writer<'_>) {
        writer.put_bytes(&(self.len() as u32).to_le_bytes());
        writer.put_bytes(self.as_bytes());
    }
}

impl Encode for String {
    fn encode(&self, writer: &mut Writer<'_>) {
        self.as_str().encode(writer);
    }
}

impl Decode for String {
    fn decode(reader: &mut Reader<'_, '_>) -> Result<Self, DecodeError> {
        let len: u32 = reader.read()?;
        let bytes = reader.take_bytes(len as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, writer: &mut Writer<'_>) {
        writer.put_bytes(&(self.len() as u32).to_le_bytes());
        for item in self {
            item.encode(writer);
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, writer: &mut Writer<'_>) {
        self.as_slice().encode(writer);
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(reader: &mut Reader<'_, '_>) -> Result<Self, DecodeError> {
        let count: u32 = reader.read()?;
        // Pre-size from the input, not the claimed count, so a corrupt
        // length cannot force a huge allocation.
        let capacity = (count as usize).min(reader.remaining().len());
        let mut items = Vec::with_capacity(capacity);
        for _ in 0..count {
            items.push(reader.read()?);
        }
        Ok(items)
    }
}

// ============================================================================
// Optional and expected
// ============================================================================

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, writer: &mut Writer<'_>) {
        writer.write(&self.is_some());
        if let Some(value) = self {
            value.encode(writer);
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(reader: &mut Reader<'_, '_>) -> Result<Self, DecodeError> {
        let present: bool = reader.read()?;
        if present {
            Ok(Some(reader.read()?))
        } else {
            Ok(None)
        }
    }
}

// The user-level success-or-error shape: a presence byte, `true` followed by
// the success value, `false` by the error value. Unrelated to the engine's
// `ResponseError` path.
impl<T: Encode, E: Encode> Encode for Result<T, E> {
    fn encode(&self, writer: &mut Writer<'_>) {
        match self {
            Ok(value) => {
                writer.write(&true);
                value.encode(writer);
            }
            Err(error) => {
                writer.write(&false);
                error.encode(writer);
            }
        }
    }
}

impl<T: Decode, E: Decode> Decode for Result<T, E> {
    fn decode(reader: &mut Reader<'_, '_>) -> Result<Self, DecodeError> {
        let ok: bool = reader.read()?;
        if ok {
            Ok(Ok(reader.read()?))
        } else {
            Ok(Err(reader.read()?))
        }
    }
}

// ============================================================================
// Tuples
// ============================================================================

macro_rules! impl_codec_tuple {
    ($($name:ident),+) => {
        impl<$($name: Encode),+> Encode for ($($name,)+) {
            fn encode(&self, writer: &mut Writer<'_>) {
                #[allow(non_snake_case)]
                let ($($name,)+) = self;
                $($name.encode(writer);)+
            }
        }

        impl<$($name: Decode),+> Decode for ($($name,)+) {
            fn decode(reader: &mut Reader<'_, '_>) -> Result<Self, DecodeError> {
                Ok(($($name::decode(reader)?,)+))
            }
        }
    };
}

impl_codec_tuple!(A);
impl_codec_tuple!(A, B);
impl_codec_tuple!(A, B, C);
impl_codec_tuple!(A, B, C, D);
impl_codec_tuple!(A, B, C, D, E);
impl_codec_tuple!(A, B, C, D, E, F);
impl_codec_tuple!(A, B, C, D, E, F, G);
impl_codec_tuple!(A, B, C, D, E, F, G, H);
impl_codec_tuple!(A, B, C, D, E, F, G, H, I);
impl_codec_tuple!(A, B, C, D, E, F, G, H, I, J);

// ============================================================================
// Engine types and custom hooks
// ============================================================================

impl Encode for ErrorCode {
    fn encode(&self, writer: &mut Writer<'_>) {
        writer.write(&self.raw());
    }
}

impl Decode for ErrorCode {
    fn decode(reader: &mut Reader<'_, '_>) -> Result<Self, DecodeError> {
        Ok(ErrorCode::new(reader.read()?))
    }
}

// Wall-clock timestamps travel as whole seconds since the Unix epoch, the
// portable equivalent of the original's time_t hook.
impl Encode for SystemTime {
    fn encode(&self, writer: &mut Writer<'_>) {
        let seconds = match self.duration_since(UNIX_EPOCH) {
            Ok(after) => after.as_secs() as i64,
            Err(before) => -(before.duration().as_secs() as i64),
        };
        writer.write(&seconds);
    }
}

impl Decode for SystemTime {
    fn decode(reader: &mut Reader<'_, '_>) -> Result<Self, DecodeError> {
        let seconds: i64 = reader.read()?;
        let time = if seconds >= 0 {
            UNIX_EPOCH.checked_add(Duration::from_secs(seconds as u64))
        } else {
            UNIX_EPOCH.checked_sub(Duration::from_secs(seconds.unsigned_abs()))
        };
        time.ok_or(DecodeError::InvalidTimestamp(seconds))
    }
}
