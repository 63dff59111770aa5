//! Fixed-layout binary structure decoding.
//!
//! All on-disk headers are described as plain structs in the `raw` modules of
//! the individual formats. Their fields are parsed in-order and are
//! deserialized using `bincode` with fixed-size integers, so the struct
//! definition doubles as documentation of the memory layout (no padding is
//! used anywhere).
//!
//! Every struct declares its size and byte order through [`RawStruct`]. Values
//! are converted to host order while decoding and are never swapped again.
//! Magic numbers are kept as `Bytes<4>` so they can be compared against the
//! literal signature regardless of the format's byte order.
//!
//! [`RawStruct`]: trait.RawStruct.html

use crate::Error;

use bincode::Options;
use serde::de::{self, DeserializeOwned};
use serde::ser::{self, SerializeTuple};

use std::fmt;
use std::marker::PhantomData;

/// Byte order of a structure's multi-byte fields.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// A fixed-size on-disk structure.
pub trait RawStruct: DeserializeOwned {
    /// Size of the encoded structure in bytes.
    const SIZE: usize;
    /// Byte order of all multi-byte fields.
    const ORDER: ByteOrder;

    /// Decodes the structure from the start of `data`.
    ///
    /// Trailing bytes are ignored.
    fn parse(data: &[u8]) -> Result<Self, Error> {
        if data.len() < Self::SIZE {
            return Err(Error::Malformed(format!(
                "structure needs {} bytes, got {}",
                Self::SIZE,
                data.len()
            )));
        }
        decode(data, Self::ORDER)
    }
}

/// Decodes a value from `data` using the given byte order.
pub fn decode<T: DeserializeOwned>(data: &[u8], order: ByteOrder) -> Result<T, Error> {
    let options = bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes();
    let result = match order {
        ByteOrder::Little => options.with_little_endian().deserialize(data),
        ByteOrder::Big => options.with_big_endian().deserialize(data),
    };
    result.map_err(|e| Error::Malformed(format!("{:?}", e)))
}

/// Encodes a value using the given byte order.
///
/// This is the exact inverse of [`decode`](fn.decode.html).
pub fn encode<T: ser::Serialize>(value: &T, order: ByteOrder) -> Result<Vec<u8>, Error> {
    let options = bincode::DefaultOptions::new().with_fixint_encoding();
    let result = match order {
        ByteOrder::Little => options.with_little_endian().serialize(value),
        ByteOrder::Big => options.with_big_endian().serialize(value),
    };
    result.map_err(|e| Error::Malformed(format!("{:?}", e)))
}

/// A serde visitor that deserializes a fixed number of elements as a tuple.
struct ArrayVisitor<T, const N: usize> {
    /// A string describing what kind of item was expected.
    expected: &'static str,
    _phantom: PhantomData<T>,
}

impl<T, const N: usize> ArrayVisitor<T, N> {
    fn new(expected: &'static str) -> Self {
        Self {
            expected,
            _phantom: PhantomData,
        }
    }
}

impl<'de, T, const N: usize> de::Visitor<'de> for ArrayVisitor<T, N>
where
    T: de::Deserialize<'de> + Copy + Default,
{
    type Value = [T; N];

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "{} ({} elements)", self.expected, N)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: de::SeqAccess<'de>,
    {
        let mut buf = [T::default(); N];
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = seq
                .next_element()?
                .ok_or_else(|| de::Error::invalid_length(i, &self))?;
        }
        Ok(buf)
    }
}

fn serialize_array<S, T>(items: &[T], serializer: S) -> Result<S::Ok, S::Error>
where
    S: ser::Serializer,
    T: ser::Serialize,
{
    let mut tuple = serializer.serialize_tuple(items.len())?;
    for item in items {
        tuple.serialize_element(item)?;
    }
    tuple.end()
}

/// A byte array of arbitrary length.
///
/// Exists because serde only implements its traits for arrays of up to 32
/// elements.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Bytes<const N: usize>(pub [u8; N]);

impl<const N: usize> Bytes<N> {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Returns whether every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl<const N: usize> Default for Bytes<N> {
    fn default() -> Self {
        Bytes([0; N])
    }
}

impl<const N: usize> fmt::Debug for Bytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x")?;
        for b in self.0.iter() {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

impl<'de, const N: usize> de::Deserialize<'de> for Bytes<N> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        // we use tuple instead of seq or bytes here since we know the length
        deserializer
            .deserialize_tuple(N, ArrayVisitor::new("byte array"))
            .map(Bytes)
    }
}

impl<const N: usize> ser::Serialize for Bytes<N> {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_array(&self.0, serializer)
    }
}

/// A NUL-padded UTF-16 string of `N` code units.
///
/// The code units follow the byte order of the containing structure.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct WideStr<const N: usize>(pub [u16; N]);

impl<const N: usize> WideStr<N> {
    /// Decodes the string up to the first NUL.
    pub fn decode(&self) -> String {
        crate::utils::utf16_cstr(&self.0)
    }
}

impl<const N: usize> fmt::Debug for WideStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&self.decode(), f)
    }
}

impl<'de, const N: usize> de::Deserialize<'de> for WideStr<N> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer
            .deserialize_tuple(N, ArrayVisitor::new("UTF-16 string"))
            .map(WideStr)
    }
}

impl<const N: usize> ser::Serialize for WideStr<N> {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_array(&self.0, serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct Probe {
        magic: Bytes<4>,
        value: u32,
        short: u16,
        name: WideStr<3>,
        blob: Bytes<40>,
    }

    impl RawStruct for Probe {
        const SIZE: usize = 4 + 4 + 2 + 6 + 40;
        const ORDER: ByteOrder = ByteOrder::Big;
    }

    fn fixture() -> Vec<u8> {
        let mut data = b"TEST".to_vec();
        data.extend_from_slice(&[0x12, 0x34, 0x56, 0x78]);
        data.extend_from_slice(&[0xAB, 0xCD]);
        data.extend_from_slice(&[0x00, 0x48, 0x00, 0x69, 0x00, 0x00]);
        data.extend((0..40).map(|i| i as u8));
        data
    }

    #[test]
    fn big_endian_fields_are_normalized() {
        let probe = Probe::parse(&fixture()).unwrap();
        assert_eq!(&probe.magic.0, b"TEST");
        assert_eq!(probe.value, 0x12345678);
        assert_eq!(probe.short, 0xABCD);
        assert_eq!(probe.name.decode(), "Hi");
        assert_eq!(probe.blob.0[39], 39);
    }

    #[test]
    fn reencoding_round_trips() {
        let data = fixture();
        let probe = Probe::parse(&data).unwrap();
        assert_eq!(encode(&probe, ByteOrder::Big).unwrap(), data);
    }

    #[test]
    fn little_endian_decode() {
        let value: (u32, u16) = decode(&[0x78, 0x56, 0x34, 0x12, 0xCD, 0xAB], ByteOrder::Little).unwrap();
        assert_eq!(value, (0x12345678, 0xABCD));
    }

    #[test]
    fn truncated_input_is_rejected() {
        let data = fixture();
        assert!(Probe::parse(&data[..Probe::SIZE - 1]).is_err());
    }
}
