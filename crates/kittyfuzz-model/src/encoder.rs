//! Encoders: pure value-to-bitstring transforms.
//!
//! Three disjoint families, matching the three value kinds a field can
//! hold:
//! - [`StrEncoder`] for byte strings,
//! - [`IntEncoder`] for integers with an explicit bit length and signedness,
//! - [`BitsEncoder`] for bit strings.
//!
//! Encoders are stateless and deterministic. Failures are configuration
//! mistakes (range, alignment, signedness, cipher setup) and surface when a
//! template encodes its default values during construction.

use crate::bits::Bits;
use crate::crypto::BlockCipher;
use crate::error::EncodingError;
use base64::Engine as _;
use std::fmt;
use std::sync::Arc;

/// Inclusive value bounds for an integer of `length` bits, saturated to the
/// `i128` working range for very wide fields.
pub(crate) fn int_bounds(length: u32, signed: bool) -> (i128, i128) {
    if length == 0 {
        return (0, 0);
    }
    if signed {
        if length >= 128 {
            return (i128::MIN, i128::MAX);
        }
        (-(1i128 << (length - 1)), (1i128 << (length - 1)) - 1)
    } else {
        if length >= 127 {
            return (0, i128::MAX);
        }
        (0, (1i128 << length) - 1)
    }
}

// ---------------------------------------------------------------------------
// String encoders
// ---------------------------------------------------------------------------

/// Encoder for byte-string values.
#[derive(Clone)]
pub enum StrEncoder {
    /// The bytes, unchanged.
    Identity,
    /// Pass-through kept for parity with text-oriented stacks; values are
    /// already bytes.
    Utf8,
    /// Lowercase hex digits.
    Hex,
    /// Standard base64 with a trailing newline.
    Base64,
    /// Standard base64, no trailing newline.
    Base64NoNewline,
    /// The bytes followed by a single NUL.
    NullTerminated,
    /// User transform over the bytes.
    Func(Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>),
    /// Block-cipher encryption of the bytes.
    Block(BlockCipher),
}

impl StrEncoder {
    /// Encode a byte string into bits.
    pub fn encode(&self, value: &[u8]) -> Result<Bits, EncodingError> {
        let out = match self {
            StrEncoder::Identity | StrEncoder::Utf8 => value.to_vec(),
            StrEncoder::Hex => hex::encode(value).into_bytes(),
            StrEncoder::Base64 => {
                let mut s = base64::engine::general_purpose::STANDARD.encode(value);
                s.push('\n');
                s.into_bytes()
            }
            StrEncoder::Base64NoNewline => base64::engine::general_purpose::STANDARD
                .encode(value)
                .into_bytes(),
            StrEncoder::NullTerminated => {
                let mut v = value.to_vec();
                v.push(0);
                v
            }
            StrEncoder::Func(f) => f(value),
            StrEncoder::Block(cipher) => cipher.encrypt(value)?,
        };
        Ok(Bits::from_bytes(&out))
    }

    pub(crate) fn tag(&self) -> String {
        match self {
            StrEncoder::Identity => "identity".to_string(),
            StrEncoder::Utf8 => "utf8".to_string(),
            StrEncoder::Hex => "hex".to_string(),
            StrEncoder::Base64 => "base64".to_string(),
            StrEncoder::Base64NoNewline => "base64-no-nl".to_string(),
            StrEncoder::NullTerminated => "null-terminated".to_string(),
            StrEncoder::Func(_) => "user-func".to_string(),
            StrEncoder::Block(c) => c.tag(),
        }
    }
}

impl Default for StrEncoder {
    fn default() -> Self {
        StrEncoder::Identity
    }
}

impl fmt::Debug for StrEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StrEncoder::{}", self.tag())
    }
}

// ---------------------------------------------------------------------------
// Integer encoders
// ---------------------------------------------------------------------------

/// Byte order for multi-byte integer encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

/// Encoder for integer values with an explicit bit length and signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntEncoder {
    /// Raw two's complement bit image, no alignment requirement.
    Raw,
    /// Big-endian bytes; the length must be byte-aligned.
    BigEndian,
    /// Little-endian bytes; the length must be byte-aligned.
    LittleEndian,
    /// ASCII decimal digits.
    AsciiDecimal,
    /// ASCII lowercase hex digits.
    AsciiHex,
    /// ASCII uppercase hex digits.
    AsciiHexUpper,
    /// 7-bit multi-byte (varint): the low seven bits of every byte carry
    /// payload, the high bit marks continuation and is cleared on the final
    /// byte. Unsigned only.
    MultiByte(Endianness),
}

impl IntEncoder {
    /// Encode `value` at `length` bits.
    pub fn encode(&self, value: i128, length: u32, signed: bool) -> Result<Bits, EncodingError> {
        match self {
            IntEncoder::Raw => {
                self.check_range(value, length, signed)?;
                Ok(Bits::from_int(value, length))
            }
            IntEncoder::BigEndian | IntEncoder::LittleEndian => {
                if length % 8 != 0 {
                    return Err(EncodingError::NotByteAligned(length));
                }
                self.check_range(value, length, signed)?;
                let mut bytes = Bits::from_int(value, length).to_bytes();
                if *self == IntEncoder::LittleEndian {
                    bytes.reverse();
                }
                Ok(Bits::from_bytes(&bytes))
            }
            IntEncoder::AsciiDecimal => Ok(Bits::from_bytes(format!("{value}").as_bytes())),
            IntEncoder::AsciiHex => Ok(Bits::from_bytes(ascii_hex(value, false).as_bytes())),
            IntEncoder::AsciiHexUpper => Ok(Bits::from_bytes(ascii_hex(value, true).as_bytes())),
            IntEncoder::MultiByte(endian) => {
                if signed {
                    return Err(EncodingError::Unsupported(
                        "signed multi-byte integers".to_string(),
                    ));
                }
                self.check_range(value, length, signed)?;
                Ok(Bits::from_bytes(&multi_byte(value as u128, *endian)))
            }
        }
    }

    fn check_range(&self, value: i128, length: u32, signed: bool) -> Result<(), EncodingError> {
        let (min, max) = int_bounds(length, signed);
        if value < min || value > max {
            return Err(EncodingError::OutOfRange {
                value,
                length,
                signed,
            });
        }
        Ok(())
    }

    pub(crate) fn tag(&self) -> &'static str {
        match self {
            IntEncoder::Raw => "raw",
            IntEncoder::BigEndian => "be",
            IntEncoder::LittleEndian => "le",
            IntEncoder::AsciiDecimal => "ascii-dec",
            IntEncoder::AsciiHex => "ascii-hex",
            IntEncoder::AsciiHexUpper => "ascii-hex-upper",
            IntEncoder::MultiByte(Endianness::Big) => "multibyte-be",
            IntEncoder::MultiByte(Endianness::Little) => "multibyte-le",
        }
    }
}

impl Default for IntEncoder {
    fn default() -> Self {
        IntEncoder::Raw
    }
}

fn ascii_hex(value: i128, upper: bool) -> String {
    let (sign, magnitude) = if value < 0 {
        ("-", value.unsigned_abs())
    } else {
        ("", value.unsigned_abs())
    };
    if upper {
        format!("{sign}{magnitude:X}")
    } else {
        format!("{sign}{magnitude:x}")
    }
}

/// Split into 7-bit groups, low-order group first, continuation bit set on
/// every group; order the groups, then clear the continuation bit on the
/// final emitted byte.
fn multi_byte(mut value: u128, endian: Endianness) -> Vec<u8> {
    let mut groups = Vec::new();
    if value == 0 {
        groups.push(0x80u8);
    }
    while value > 0 {
        groups.push(((value & 0x7f) as u8) | 0x80);
        value >>= 7;
    }
    if endian == Endianness::Big {
        groups.reverse();
    }
    if let Some(last) = groups.last_mut() {
        *last &= 0x7f;
    }
    groups
}

// ---------------------------------------------------------------------------
// Bits encoders
// ---------------------------------------------------------------------------

/// Encoder for bit-string values.
#[derive(Clone)]
pub enum BitsEncoder {
    /// The bits, unchanged.
    Identity,
    /// Zero bits appended up to the next byte boundary.
    ByteAligned,
    /// The bits in reverse order.
    Reverse,
    /// Byte-align, then run a string encoder over the bytes.
    Wrapped(StrEncoder),
}

impl BitsEncoder {
    /// Encode bits into bits.
    pub fn encode(&self, value: &Bits) -> Result<Bits, EncodingError> {
        match self {
            BitsEncoder::Identity => Ok(value.clone()),
            BitsEncoder::ByteAligned => Ok(byte_align(value)),
            BitsEncoder::Reverse => Ok(value.reversed()),
            BitsEncoder::Wrapped(inner) => inner.encode(&byte_align(value).to_bytes()),
        }
    }

    pub(crate) fn tag(&self) -> String {
        match self {
            BitsEncoder::Identity => "identity".to_string(),
            BitsEncoder::ByteAligned => "byte-aligned".to_string(),
            BitsEncoder::Reverse => "reverse".to_string(),
            BitsEncoder::Wrapped(inner) => format!("wrapped-{}", inner.tag()),
        }
    }
}

impl Default for BitsEncoder {
    fn default() -> Self {
        BitsEncoder::Identity
    }
}

impl fmt::Debug for BitsEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitsEncoder::{}", self.tag())
    }
}

fn byte_align(value: &Bits) -> Bits {
    let rem = value.len() % 8;
    if rem == 0 {
        value.clone()
    } else {
        value.concat(&Bits::zeros(8 - rem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn str_identity_and_null_terminated() {
        let enc = StrEncoder::Identity;
        assert_eq!(enc.encode(b"abc").expect("encodes").to_bytes(), b"abc");
        let enc = StrEncoder::NullTerminated;
        assert_eq!(enc.encode(b"abc").expect("encodes").to_bytes(), b"abc\x00");
        assert_eq!(enc.encode(b"").expect("encodes").to_bytes(), b"\x00");
    }

    #[test]
    fn str_hex_and_base64() {
        assert_eq!(
            StrEncoder::Hex.encode(b"\xde\xad").expect("encodes").to_bytes(),
            b"dead"
        );
        assert_eq!(
            StrEncoder::Base64.encode(b"abc").expect("encodes").to_bytes(),
            b"YWJj\n"
        );
        assert_eq!(
            StrEncoder::Base64NoNewline
                .encode(b"abc")
                .expect("encodes")
                .to_bytes(),
            b"YWJj"
        );
    }

    #[test]
    fn str_user_func() {
        let enc = StrEncoder::Func(Arc::new(|v: &[u8]| v.iter().rev().copied().collect()));
        assert_eq!(enc.encode(b"abc").expect("encodes").to_bytes(), b"cba");
    }

    #[test]
    fn int_raw_and_endian() {
        let enc = IntEncoder::Raw;
        assert_eq!(enc.encode(5, 3, false).expect("encodes").len(), 3);
        assert_eq!(
            IntEncoder::BigEndian
                .encode(0x1234, 16, false)
                .expect("encodes")
                .to_bytes(),
            vec![0x12, 0x34]
        );
        assert_eq!(
            IntEncoder::LittleEndian
                .encode(0x1234, 16, false)
                .expect("encodes")
                .to_bytes(),
            vec![0x34, 0x12]
        );
    }

    #[test]
    fn int_endian_requires_alignment() {
        assert_eq!(
            IntEncoder::BigEndian.encode(1, 12, false),
            Err(EncodingError::NotByteAligned(12))
        );
        assert!(IntEncoder::Raw.encode(1, 12, false).is_ok());
    }

    #[test]
    fn int_out_of_range() {
        assert!(matches!(
            IntEncoder::Raw.encode(256, 8, false),
            Err(EncodingError::OutOfRange { .. })
        ));
        assert!(matches!(
            IntEncoder::Raw.encode(-129, 8, true),
            Err(EncodingError::OutOfRange { .. })
        ));
        assert!(IntEncoder::Raw.encode(-128, 8, true).is_ok());
    }

    #[test]
    fn int_signed_negative_twos_complement() {
        assert_eq!(
            IntEncoder::BigEndian
                .encode(-2, 16, true)
                .expect("encodes")
                .to_bytes(),
            vec![0xff, 0xfe]
        );
    }

    #[test]
    fn int_ascii() {
        assert_eq!(
            IntEncoder::AsciiDecimal
                .encode(-17, 32, true)
                .expect("encodes")
                .to_bytes(),
            b"-17"
        );
        assert_eq!(
            IntEncoder::AsciiHex.encode(255, 32, false).expect("encodes").to_bytes(),
            b"ff"
        );
        assert_eq!(
            IntEncoder::AsciiHexUpper
                .encode(255, 32, false)
                .expect("encodes")
                .to_bytes(),
            b"FF"
        );
    }

    #[test]
    fn multibyte_big_endian() {
        let enc = IntEncoder::MultiByte(Endianness::Big);
        assert_eq!(enc.encode(0, 8, false).expect("encodes").to_bytes(), vec![0x00]);
        assert_eq!(enc.encode(5, 8, false).expect("encodes").to_bytes(), vec![0x05]);
        // 129 = 1<<7 | 1: high group first with continuation, low group clear.
        assert_eq!(
            enc.encode(129, 16, false).expect("encodes").to_bytes(),
            vec![0x81, 0x01]
        );
        // 0x4000 = 1<<14: three groups.
        assert_eq!(
            enc.encode(0x4000, 16, false).expect("encodes").to_bytes(),
            vec![0x81, 0x80, 0x00]
        );
    }

    #[test]
    fn multibyte_little_endian() {
        let enc = IntEncoder::MultiByte(Endianness::Little);
        // LEB128-style: low group first with continuation, final group clear.
        assert_eq!(
            enc.encode(129, 16, false).expect("encodes").to_bytes(),
            vec![0x81, 0x01]
        );
        assert_eq!(
            enc.encode(0x4000, 16, false).expect("encodes").to_bytes(),
            vec![0x80, 0x80, 0x01]
        );
    }

    #[test]
    fn multibyte_rejects_signed() {
        assert!(matches!(
            IntEncoder::MultiByte(Endianness::Big).encode(1, 8, true),
            Err(EncodingError::Unsupported(_))
        ));
    }

    #[test]
    fn bits_byte_aligned_pads_with_zeros() {
        let b = Bits::from_int(0b101, 3);
        let padded = BitsEncoder::ByteAligned.encode(&b).expect("encodes");
        assert_eq!(padded.len(), 8);
        assert_eq!(padded.to_bytes(), vec![0b1010_0000]);
        // Already aligned input is unchanged.
        let b = Bits::from_bytes(&[0x42]);
        assert_eq!(BitsEncoder::ByteAligned.encode(&b).expect("encodes"), b);
    }

    #[test]
    fn bits_reverse() {
        let b = Bits::from_bytes(&[0x01]);
        assert_eq!(
            BitsEncoder::Reverse.encode(&b).expect("encodes").to_bytes(),
            vec![0x80]
        );
    }

    #[test]
    fn bits_wrapped_aligns_then_encodes() {
        let enc = BitsEncoder::Wrapped(StrEncoder::Hex);
        let b = Bits::from_bytes(&[0xab]);
        assert_eq!(enc.encode(&b).expect("encodes").to_bytes(), b"ab");
        // 4 loose bits are zero-padded to a byte before hex encoding.
        let b = Bits::from_int(0xa, 4);
        assert_eq!(enc.encode(&b).expect("encodes").to_bytes(), b"a0");
    }
}
