//! Declaration macros for user types.
//!
//! Rust has no field reflection, so a type's wire layout is derived from an
//! explicit declaration instead: [`describe_record!`] lists a struct's
//! fields in wire order, [`describe_enum!`] maps a C-like enumeration to its
//! integer representation, and [`describe_variant!`] maps a tagged union's
//! alternatives to zero-based indices. A hand-written `Encode`/`Decode`
//! pair always works instead and takes precedence by not invoking a macro.

/// Derive `Encode`/`Decode` for a struct from its field list.
///
/// Fields are encoded in the declared order with no framing between them,
/// so the list must match on both peers.
///
/// ```
/// use parley_codec::{describe_record, Reader, Writer};
///
/// #[derive(Debug, PartialEq)]
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// describe_record!(Point { x, y });
///
/// let mut w = Writer::new();
/// w.write(&Point { x: 1, y: 2 });
/// let payload = w.into_payload();
/// let p: Point = Reader::new(&payload).read().unwrap();
/// assert_eq!(p, Point { x: 1, y: 2 });
/// ```
#[macro_export]
macro_rules! describe_record {
    ($ty:ident { $($field:ident),+ $(,)? }) => {
        impl $crate::Encode for $ty {
            fn encode(&self, writer: &mut $crate::Writer<'_>) {
                $(writer.write(&self.$field);)+
            }
        }

        impl $crate::Decode for $ty {
            fn decode(
                reader: &mut $crate::Reader<'_, '_>,
            ) -> ::core::result::Result<Self, $crate::DecodeError> {
                Ok(Self {
                    $($field: reader.read()?,)+
                })
            }
        }
    };
}

/// Derive `Encode`/`Decode` for a C-like enumeration, encoded as its
/// integer representation.
///
/// ```
/// use parley_codec::{describe_enum, Reader, Writer};
///
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// enum Phase {
///     Beginning,
///     End,
/// }
///
/// describe_enum!(Phase as i32 { Beginning, End });
///
/// let mut w = Writer::new();
/// w.write(&Phase::End);
/// assert_eq!(w.into_payload(), 1i32.to_le_bytes());
/// ```
#[macro_export]
macro_rules! describe_enum {
    ($ty:ident as $repr:ty { $($variant:ident),+ $(,)? }) => {
        impl $crate::Encode for $ty {
            fn encode(&self, writer: &mut $crate::Writer<'_>) {
                writer.write(&(*self as $repr));
            }
        }

        impl $crate::Decode for $ty {
            fn decode(
                reader: &mut $crate::Reader<'_, '_>,
            ) -> ::core::result::Result<Self, $crate::DecodeError> {
                let raw: $repr = reader.read()?;
                $(
                    if raw == $ty::$variant as $repr {
                        return Ok($ty::$variant);
                    }
                )+
                Err($crate::DecodeError::InvalidEnum { raw: raw as i64 })
            }
        }
    };
}

/// Derive `Encode`/`Decode` for a tagged union: a little-endian `u16`
/// zero-based alternative index followed by the alternative's encoding.
///
/// Every alternative carries exactly one payload; use `()` for an
/// alternative with no data.
///
/// ```
/// use parley_codec::{describe_variant, Reader, Writer};
///
/// #[derive(Debug, PartialEq)]
/// enum Term {
///     Int(i32),
///     Text(String),
/// }
///
/// describe_variant!(Term {
///     Int(i32) = 0,
///     Text(String) = 1,
/// });
///
/// let mut w = Writer::new();
/// w.write(&Term::Int(75));
/// let payload = w.into_payload();
/// assert_eq!(&payload[..2], &[0, 0]);
/// let t: Term = Reader::new(&payload).read().unwrap();
/// assert_eq!(t, Term::Int(75));
/// ```
#[macro_export]
macro_rules! describe_variant {
    ($ty:ident { $($variant:ident($inner:ty) = $index:literal),+ $(,)? }) => {
        impl $crate::Encode for $ty {
            fn encode(&self, writer: &mut $crate::Writer<'_>) {
                match self {
                    $(
                        $ty::$variant(value) => {
                            writer.write(&($index as u16));
                            writer.write(value);
                        }
                    )+
                }
            }
        }

        impl $crate::Decode for $ty {
            fn decode(
                reader: &mut $crate::Reader<'_, '_>,
            ) -> ::core::result::Result<Self, $crate::DecodeError> {
                let tag: u16 = reader.read()?;
                match tag {
                    $($index => Ok($ty::$variant(reader.read()?)),)+
                    other => Err($crate::DecodeError::UnknownVariant { tag: other }),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::{DecodeError, Reader, Writer};

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Color {
        Red,
        Green,
        Blue,
    }

    describe_enum!(Color as i32 { Red, Green, Blue });

    #[derive(Debug, PartialEq)]
    enum Shape {
        Circle(f64),
        Label(String),
        Empty(()),
    }

    describe_variant!(Shape {
        Circle(f64) = 0,
        Label(String) = 1,
        Empty(()) = 2,
    });

    #[derive(Debug, PartialEq)]
    struct Sample {
        id: u32,
        name: String,
        color: Color,
        shape: Shape,
    }

    describe_record!(Sample { id, name, color, shape });

    #[test]
    fn enum_encodes_as_integer_representation() {
        let mut w = Writer::new();
        w.write(&Color::Blue);
        let payload = w.into_payload();
        assert_eq!(payload, 2i32.to_le_bytes());
        assert_eq!(Reader::new(&payload).read::<Color>().unwrap(), Color::Blue);
    }

    #[test]
    fn enum_rejects_undeclared_values() {
        let payload = 9i32.to_le_bytes();
        assert_eq!(
            Reader::new(&payload).read::<Color>().unwrap_err(),
            DecodeError::InvalidEnum { raw: 9 }
        );
    }

    #[test]
    fn variant_encodes_index_then_value() {
        let mut w = Writer::new();
        w.write(&Shape::Label(String::from("hi")));
        let payload = w.into_payload();
        assert_eq!(&payload[..2], &1u16.to_le_bytes());
        assert_eq!(
            Reader::new(&payload).read::<Shape>().unwrap(),
            Shape::Label(String::from("hi"))
        );

        let mut w = Writer::new();
        w.write(&Shape::Empty(()));
        // A unit alternative is just the tag.
        assert_eq!(w.into_payload(), 2u16.to_le_bytes());
    }

    #[test]
    fn variant_rejects_unknown_tags() {
        let payload = 7u16.to_le_bytes();
        assert_eq!(
            Reader::new(&payload).read::<Shape>().unwrap_err(),
            DecodeError::UnknownVariant { tag: 7 }
        );
    }

    #[test]
    fn record_roundtrips_field_by_field() {
        let sample = Sample {
            id: 11,
            name: String::from("probe"),
            color: Color::Green,
            shape: Shape::Circle(2.5),
        };
        let mut w = Writer::new();
        w.write(&sample);
        let payload = w.into_payload();

        // id, then length-prefixed name, then the enum word.
        assert_eq!(&payload[..4], &11u32.to_le_bytes());
        assert_eq!(&payload[4..8], &5u32.to_le_bytes());
        assert_eq!(&payload[8..13], b"probe");
        assert_eq!(&payload[13..17], &1i32.to_le_bytes());

        assert_eq!(Reader::new(&payload).read::<Sample>().unwrap(), sample);
    }
}
