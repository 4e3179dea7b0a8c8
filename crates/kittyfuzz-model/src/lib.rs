//! Data model and mutation engine for kittyfuzz.
//!
//! A message template is a tree of typed fields. Each field owns a finite,
//! ordered, deterministic library of mutations; containers compose their
//! children's libraries sequentially; calculated fields (sizes, checksums,
//! hashes, clones) derive their rendering from other nodes at render time.
//! [`Template`] wraps a tree into one enumerable stream:
//!
//! ```
//! use kittyfuzz_model::{Container, Size, Static, StringField, Template};
//!
//! let mut template = Template::new(
//!     "demo",
//!     Container::new(vec![
//!         Static::new("HELLO ").into(),
//!         Size::new("payload", 32).into(),
//!         StringField::new("kitty").with_name("payload").into(),
//!     ]),
//! )
//! .expect("valid template");
//!
//! let first = template.render_bytes();
//! while template.mutate() {
//!     let _payload = template.render_bytes();
//! }
//! template.reset();
//! assert_eq!(template.render_bytes(), first);
//! ```

#![forbid(unsafe_code)]

mod aliases;
mod bits;
mod calculated;
mod condition;
mod container;
mod crypto;
mod encoder;
mod engine;
mod error;
mod field;
mod library;
mod mutated;
mod template;

pub use aliases::{
    equal, not_equal, s16_be, s16_le, s32_be, s32_le, s64_be, s64_le, s8_field, size_in_bits,
    size_in_bytes, u16_be, u16_le, u32_be, u32_le, u64_be, u64_le, u8_field,
};
pub use bits::Bits;
pub use calculated::{
    CalculatedBits, CalculatedStr, Checksum, CloneOf, ElementCount, HashField, IndexOf, Size,
};
pub use condition::{Condition, ConditionValue};
pub use container::{Container, ForEach, If, IfNot, Repeat};
pub use crypto::{
    BlockCipher, ChecksumAlgorithm, CipherAlgorithm, CipherMode, CipherPadding, HashAlgorithm,
    KeySource,
};
pub use encoder::{BitsEncoder, Endianness, IntEncoder, StrEncoder};
pub use error::{EncodingError, ModelError};
pub use field::{
    BitField, Delimiter, Dynamic, Field, Group, RandomBits, RandomBytes, Static, StringField,
};
pub use mutated::{BitFlip, BitFlips, ByteFlip, ByteFlips};
pub use template::{Template, STAGE_ANY};
