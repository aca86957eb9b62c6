use std::{
    fmt::{Debug, Display, Formatter},
    io::ErrorKind,
    str::FromStr,
};

use byteorder::{BigEndian, ReadBytesExt};
use fixed::types::{I16F16, I2F30, U16F16, U8F8};
use fixed_macro::types::{I16F16, I2F30};

use crate::{Error, Result};

pub mod esds;
pub mod qt;
pub mod sample_entry;

pub trait Decode: Sized {
    fn decode(input: &mut &[u8]) -> Result<Self>;
}

impl Decode for u8 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(input.read_u8()?)
    }
}

impl Decode for u16 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(input.read_u16::<BigEndian>()?)
    }
}

impl Decode for i16 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(input.read_i16::<BigEndian>()?)
    }
}

impl Decode for U8F8 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(Self::from_bits(input.read_u16::<BigEndian>()?))
    }
}

impl Decode for u32 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(input.read_u32::<BigEndian>()?)
    }
}

impl Decode for i32 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(input.read_i32::<BigEndian>()?)
    }
}

impl Decode for U16F16 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(Self::from_bits(input.read_u32::<BigEndian>()?))
    }
}

impl Decode for I16F16 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(Self::from_bits(input.read_i32::<BigEndian>()?))
    }
}

impl Decode for I2F30 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(Self::from_bits(input.read_i32::<BigEndian>()?))
    }
}

impl Decode for u64 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(input.read_u64::<BigEndian>()?)
    }
}

impl Decode for i64 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(input.read_i64::<BigEndian>()?)
    }
}

impl Decode for f64 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(input.read_f64::<BigEndian>()?)
    }
}

/// Splits `len` bytes off the front of `input`.
pub fn take<'a>(input: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    if input.len() < len {
        return Err(std::io::Error::from(ErrorKind::UnexpectedEof).into());
    }
    let (data, remaining_data) = input.split_at(len);
    *input = remaining_data;
    Ok(data)
}

pub fn skip(input: &mut &[u8], len: usize) -> Result<()> {
    take(input, len).map(|_| ())
}

/// Reads a length-prefixed string. With `field_len` the string occupies a fixed-size field
/// (length byte included) and the whole field is consumed.
pub fn decode_pascal_string(input: &mut &[u8], field_len: Option<usize>) -> Result<String> {
    let field = match field_len {
        Some(field_len) => take(input, field_len)?,
        None => {
            let length = input.first().copied().unwrap_or(0) as usize;
            take(input, (length + 1).min(input.len()))?
        }
    };
    let Some((&length, data)) = field.split_first() else {
        return Ok(String::new());
    };
    let data = &data[..(length as usize).min(data.len())];
    Ok(String::from_utf8_lossy(data).into_owned())
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FourCC(pub u32);

impl FourCC {
    pub const MOOV: Self = Self::new(b"moov");
    pub const ZLIB: Self = Self::new(b"zlib");
    pub const QDM2: Self = Self::new(b"QDM2");

    pub const fn new(tag: &[u8; 4]) -> Self {
        Self(u32::from_be_bytes(*tag))
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl From<[u8; 4]> for FourCC {
    fn from(value: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(value))
    }
}

impl Decode for FourCC {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(Self(Decode::decode(input)?))
    }
}

impl Display for FourCC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for byte in self.to_bytes() {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}

impl Debug for FourCC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl FromStr for FourCC {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let tag: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| Error::InvalidPayload("four character code must be 4 bytes"))?;
        Ok(tag.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Matrix {
    pub a: I16F16,
    pub b: I16F16,
    pub u: I2F30,
    pub c: I16F16,
    pub d: I16F16,
    pub v: I2F30,
    pub x: I16F16,
    pub y: I16F16,
    pub w: I2F30,
}

impl Matrix {
    pub fn identity() -> Self {
        Self {
            a: I16F16!(1),
            b: I16F16!(0),
            u: I2F30!(0),
            c: I16F16!(0),
            d: I16F16!(1),
            v: I2F30!(0),
            x: I16F16!(0),
            y: I16F16!(0),
            w: I2F30!(1),
        }
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl Decode for Matrix {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            a: Decode::decode(input)?,
            b: Decode::decode(input)?,
            u: Decode::decode(input)?,
            c: Decode::decode(input)?,
            d: Decode::decode(input)?,
            v: Decode::decode(input)?,
            x: Decode::decode(input)?,
            y: Decode::decode(input)?,
            w: Decode::decode(input)?,
        })
    }
}
