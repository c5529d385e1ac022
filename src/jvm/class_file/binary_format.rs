use crate::jvm::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Result};

/// Utility trait for serializing data inside class files
///
/// Java class files have some peculiarities that make it useful to define an extra trait (instead
/// of just using `serde`):
///
///   - tags are always `u8`
///   - when serializing a sequence, the length of the sequence is usually `u16`
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;

    /// Serialize into a fresh buffer
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = vec![];
        self.serialize(&mut buffer)?;
        Ok(buffer)
    }
}

/// Counterpart of [`Serialize`] for reading class file structures
///
/// Every `Parse` implementation reads exactly what the matching `Serialize` implementation
/// writes, so sequences are again prefixed with a `u16` length.
pub trait Parse: Sized {
    /// Read the construct from a binary input stream
    fn parse<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error>;

    /// Read the construct from a buffer, requiring that the whole buffer is consumed
    fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, Error> {
        let mut cursor = Cursor::new(bytes);
        let parsed = Self::parse(&mut cursor)?;
        let remaining = bytes.len() - cursor.position() as usize;
        if remaining != 0 {
            return Err(Error::TrailingBytes(remaining));
        }
        Ok(parsed)
    }
}

macro_rules! numeric_binary_format {
    ($($num:ty => $write:ident, $read:ident;)*) => {
        $(
            impl Serialize for $num {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                    writer.$write::<BigEndian>(*self)
                }
            }

            impl Parse for $num {
                fn parse<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
                    Ok(reader.$read::<BigEndian>()?)
                }
            }
        )*
    };
}

numeric_binary_format! {
    u16 => write_u16, read_u16;
    u32 => write_u32, read_u32;
    u64 => write_u64, read_u64;
    i16 => write_i16, read_i16;
    i32 => write_i32, read_i32;
    i64 => write_i64, read_i64;
    f32 => write_f32, read_f32;
    f64 => write_f64, read_f64;
}

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Parse for u8 {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        Ok(reader.read_u8()?)
    }
}

impl Serialize for i8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i8(*self)
    }
}

impl Parse for i8 {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        Ok(reader.read_i8()?)
    }
}

/// Size in `u16` is the first thing serialized/deserialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.len() as u16).serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

impl<A: Parse> Parse for Vec<A> {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        let len = u16::parse(reader)?;
        let mut elems = Vec::with_capacity(len as usize);
        for _ in 0..len {
            elems.push(A::parse(reader)?);
        }
        Ok(elems)
    }
}

/// Read exactly `len` raw bytes
pub fn parse_raw_bytes<R: ReadBytesExt>(
    reader: &mut R,
    len: usize,
) -> std::result::Result<Vec<u8>, Error> {
    let mut buffer = vec![0; len];
    reader.read_exact(&mut buffer)?;
    Ok(buffer)
}
