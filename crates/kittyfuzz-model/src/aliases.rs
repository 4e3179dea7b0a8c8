//! Convenience constructors for the common binary field shapes.

use crate::calculated::Size;
use crate::condition::{Condition, ConditionValue};
use crate::encoder::IntEncoder;
use crate::field::BitField;

macro_rules! uint_alias {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $bits:expr, $encoder:expr, $signed:expr) => {
        $(#[$doc])*
        #[must_use]
        pub fn $name(value: $ty) -> BitField {
            BitField::new(value, $bits)
                .signed($signed)
                .with_encoder($encoder)
        }
    };
}

uint_alias!(
    /// Unsigned 8-bit integer.
    u8_field, u8, 8, IntEncoder::Raw, false
);
uint_alias!(
    /// Unsigned 16-bit integer, big-endian.
    u16_be, u16, 16, IntEncoder::BigEndian, false
);
uint_alias!(
    /// Unsigned 16-bit integer, little-endian.
    u16_le, u16, 16, IntEncoder::LittleEndian, false
);
uint_alias!(
    /// Unsigned 32-bit integer, big-endian.
    u32_be, u32, 32, IntEncoder::BigEndian, false
);
uint_alias!(
    /// Unsigned 32-bit integer, little-endian.
    u32_le, u32, 32, IntEncoder::LittleEndian, false
);
uint_alias!(
    /// Unsigned 64-bit integer, big-endian.
    u64_be, u64, 64, IntEncoder::BigEndian, false
);
uint_alias!(
    /// Unsigned 64-bit integer, little-endian.
    u64_le, u64, 64, IntEncoder::LittleEndian, false
);
uint_alias!(
    /// Signed 8-bit integer.
    s8_field, i8, 8, IntEncoder::Raw, true
);
uint_alias!(
    /// Signed 16-bit integer, big-endian.
    s16_be, i16, 16, IntEncoder::BigEndian, true
);
uint_alias!(
    /// Signed 16-bit integer, little-endian.
    s16_le, i16, 16, IntEncoder::LittleEndian, true
);
uint_alias!(
    /// Signed 32-bit integer, big-endian.
    s32_be, i32, 32, IntEncoder::BigEndian, true
);
uint_alias!(
    /// Signed 32-bit integer, little-endian.
    s32_le, i32, 32, IntEncoder::LittleEndian, true
);
uint_alias!(
    /// Signed 64-bit integer, big-endian.
    s64_be, i64, 64, IntEncoder::BigEndian, true
);
uint_alias!(
    /// Signed 64-bit integer, little-endian.
    s64_le, i64, 64, IntEncoder::LittleEndian, true
);

/// Byte-counting size field, the common wire shape.
#[must_use]
pub fn size_in_bytes(depends_on: impl Into<String>, length: u32) -> Size {
    Size::new(depends_on, length)
}

/// Bit-counting size field.
#[must_use]
pub fn size_in_bits(depends_on: impl Into<String>, length: u32) -> Size {
    Size::in_bits(depends_on, length)
}

/// Condition: the named field's current value equals `value`.
#[must_use]
pub fn equal(field: impl Into<String>, value: impl Into<ConditionValue>) -> Condition {
    Condition::equal(field, value)
}

/// Condition: the named field's current value differs from `value`.
#[must_use]
pub fn not_equal(field: impl Into<String>, value: impl Into<ConditionValue>) -> Condition {
    Condition::not_equal(field, value)
}
