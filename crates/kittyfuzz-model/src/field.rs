//! Leaf field declarations.
//!
//! These structs describe fields; [`crate::Template::new`] compiles a tree
//! of them into the runtime engine, validating parameters along the way.
//! Every leaf owns a default value of one of three kinds (bytes, integer,
//! bits), an encoder binding, and a `fuzzable` flag.

use crate::calculated::{CalculatedBits, CalculatedStr, Checksum, CloneOf, ElementCount, HashField, IndexOf, Size};
use crate::container::{Container, ForEach, If, IfNot, Repeat};
use crate::encoder::{BitsEncoder, IntEncoder, StrEncoder};
use crate::mutated::{BitFlip, BitFlips, ByteFlip, ByteFlips};

/// A field or container declaration; the input to template compilation.
#[derive(Debug, Clone)]
pub enum Field {
    Static(Static),
    String(StringField),
    Delimiter(Delimiter),
    Group(Group),
    BitField(BitField),
    Dynamic(Dynamic),
    RandomBits(RandomBits),
    RandomBytes(RandomBytes),
    BitFlip(BitFlip),
    BitFlips(BitFlips),
    ByteFlip(ByteFlip),
    ByteFlips(ByteFlips),
    CloneOf(CloneOf),
    CalculatedBits(CalculatedBits),
    CalculatedStr(CalculatedStr),
    HashField(HashField),
    Size(Size),
    ElementCount(ElementCount),
    IndexOf(IndexOf),
    Checksum(Checksum),
    Container(Container),
    If(If),
    IfNot(IfNot),
    Repeat(Repeat),
    ForEach(ForEach),
}

impl Field {
    /// The declared name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Field::Static(f) => f.name.as_deref(),
            Field::String(f) => f.name.as_deref(),
            Field::Delimiter(f) => f.name.as_deref(),
            Field::Group(f) => f.name.as_deref(),
            Field::BitField(f) => f.name.as_deref(),
            Field::Dynamic(f) => f.name.as_deref(),
            Field::RandomBits(f) => f.name.as_deref(),
            Field::RandomBytes(f) => f.name.as_deref(),
            Field::BitFlip(f) => f.name.as_deref(),
            Field::BitFlips(f) => f.name.as_deref(),
            Field::ByteFlip(f) => f.name.as_deref(),
            Field::ByteFlips(f) => f.name.as_deref(),
            Field::CloneOf(f) => f.name.as_deref(),
            Field::CalculatedBits(f) => f.name.as_deref(),
            Field::CalculatedStr(f) => f.name.as_deref(),
            Field::HashField(f) => f.name.as_deref(),
            Field::Size(f) => f.name.as_deref(),
            Field::ElementCount(f) => f.name.as_deref(),
            Field::IndexOf(f) => f.name.as_deref(),
            Field::Checksum(f) => f.name.as_deref(),
            Field::Container(f) => f.name.as_deref(),
            Field::If(f) => f.name.as_deref(),
            Field::IfNot(f) => f.name.as_deref(),
            Field::Repeat(f) => f.name.as_deref(),
            Field::ForEach(f) => f.name.as_deref(),
        }
    }
}

macro_rules! into_field {
    ($($variant:ident),* $(,)?) => {
        $(impl From<$variant> for Field {
            fn from(f: $variant) -> Field {
                Field::$variant(f)
            }
        })*
    };
}

into_field!(
    Static, Delimiter, Group, BitField, Dynamic, RandomBits, RandomBytes, BitFlip, BitFlips,
    ByteFlip, ByteFlips, CloneOf, CalculatedBits, CalculatedStr, HashField, Size, ElementCount,
    IndexOf, Checksum, Container, If, IfNot, Repeat, ForEach,
);

impl From<StringField> for Field {
    fn from(f: StringField) -> Field {
        Field::String(f)
    }
}

// ---------------------------------------------------------------------------
// Static
// ---------------------------------------------------------------------------

/// A constant byte string; never mutates.
#[derive(Debug, Clone)]
pub struct Static {
    pub(crate) value: Vec<u8>,
    pub(crate) encoder: StrEncoder,
    pub(crate) name: Option<String>,
}

impl Static {
    #[must_use]
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Static {
            value: value.into(),
            encoder: StrEncoder::Identity,
            name: None,
        }
    }

    #[must_use]
    pub fn with_encoder(mut self, encoder: StrEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

// ---------------------------------------------------------------------------
// String
// ---------------------------------------------------------------------------

/// A byte string whose mutations target common string-handling bugs.
#[derive(Debug, Clone)]
pub struct StringField {
    pub(crate) value: Vec<u8>,
    pub(crate) max_size: Option<usize>,
    pub(crate) encoder: StrEncoder,
    pub(crate) fuzzable: bool,
    pub(crate) name: Option<String>,
}

impl StringField {
    #[must_use]
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        StringField {
            value: value.into(),
            max_size: None,
            encoder: StrEncoder::Identity,
            fuzzable: true,
            name: None,
        }
    }

    /// Suppress library entries longer than `max_size` bytes.
    #[must_use]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    #[must_use]
    pub fn with_encoder(mut self, encoder: StrEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn fuzzable(mut self, fuzzable: bool) -> Self {
        self.fuzzable = fuzzable;
        self
    }
}

// ---------------------------------------------------------------------------
// Delimiter
// ---------------------------------------------------------------------------

/// A textual delimiter; mutations swap in other delimiter runs.
#[derive(Debug, Clone)]
pub struct Delimiter {
    pub(crate) value: Vec<u8>,
    pub(crate) max_size: Option<usize>,
    pub(crate) encoder: StrEncoder,
    pub(crate) fuzzable: bool,
    pub(crate) name: Option<String>,
}

impl Delimiter {
    #[must_use]
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Delimiter {
            value: value.into(),
            max_size: None,
            encoder: StrEncoder::Identity,
            fuzzable: true,
            name: None,
        }
    }

    #[must_use]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    #[must_use]
    pub fn with_encoder(mut self, encoder: StrEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn fuzzable(mut self, fuzzable: bool) -> Self {
        self.fuzzable = fuzzable;
        self
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// A fixed set of alternative byte strings; the first is the default.
#[derive(Debug, Clone)]
pub struct Group {
    pub(crate) values: Vec<Vec<u8>>,
    pub(crate) encoder: StrEncoder,
    pub(crate) fuzzable: bool,
    pub(crate) name: Option<String>,
}

impl Group {
    #[must_use]
    pub fn new<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Vec<u8>>,
    {
        Group {
            values: values.into_iter().map(Into::into).collect(),
            encoder: StrEncoder::Identity,
            fuzzable: true,
            name: None,
        }
    }

    #[must_use]
    pub fn with_encoder(mut self, encoder: StrEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn fuzzable(mut self, fuzzable: bool) -> Self {
        self.fuzzable = fuzzable;
        self
    }
}

// ---------------------------------------------------------------------------
// BitField
// ---------------------------------------------------------------------------

/// A fixed-length integer; mutations probe boundary and off-by-N values.
#[derive(Debug, Clone)]
pub struct BitField {
    pub(crate) value: i128,
    pub(crate) length: u32,
    pub(crate) signed: bool,
    pub(crate) min_value: Option<i128>,
    pub(crate) max_value: Option<i128>,
    pub(crate) encoder: IntEncoder,
    pub(crate) fuzzable: bool,
    pub(crate) name: Option<String>,
}

impl BitField {
    #[must_use]
    pub fn new(value: impl Into<i128>, length: u32) -> Self {
        BitField {
            value: value.into(),
            length,
            signed: false,
            min_value: None,
            max_value: None,
            encoder: IntEncoder::Raw,
            fuzzable: true,
            name: None,
        }
    }

    #[must_use]
    pub fn signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    /// Restrict the value range below the natural bit-length bound.
    #[must_use]
    pub fn with_min_value(mut self, min_value: impl Into<i128>) -> Self {
        self.min_value = Some(min_value.into());
        self
    }

    /// Restrict the value range above the natural bit-length bound.
    #[must_use]
    pub fn with_max_value(mut self, max_value: impl Into<i128>) -> Self {
        self.max_value = Some(max_value.into());
        self
    }

    #[must_use]
    pub fn with_encoder(mut self, encoder: IntEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn fuzzable(mut self, fuzzable: bool) -> Self {
        self.fuzzable = fuzzable;
        self
    }
}

// ---------------------------------------------------------------------------
// Dynamic
// ---------------------------------------------------------------------------

/// A field whose value is supplied at runtime through a session-data key.
/// When fuzzable (requires an explicit byte length L), mutation i flips
/// bit i of the current value; `num_mutations == L * 8`.
#[derive(Debug, Clone)]
pub struct Dynamic {
    pub(crate) key: String,
    pub(crate) default_value: Vec<u8>,
    pub(crate) length: Option<usize>,
    pub(crate) encoder: StrEncoder,
    pub(crate) fuzzable: bool,
    pub(crate) name: Option<String>,
}

impl Dynamic {
    #[must_use]
    pub fn new(key: impl Into<String>, default_value: impl Into<Vec<u8>>) -> Self {
        Dynamic {
            key: key.into(),
            default_value: default_value.into(),
            length: None,
            encoder: StrEncoder::Identity,
            fuzzable: false,
            name: None,
        }
    }

    /// Byte length of the value; required when fuzzable.
    #[must_use]
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    #[must_use]
    pub fn with_encoder(mut self, encoder: StrEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn fuzzable(mut self, fuzzable: bool) -> Self {
        self.fuzzable = fuzzable;
        self
    }
}

// ---------------------------------------------------------------------------
// Random fields
// ---------------------------------------------------------------------------

/// A seeded, reproducible random bit sequence. Lengths are drawn from
/// `[min_length, max_length]` bits, or walk `min, min+step, …` when a step
/// is set. `reset` re-seeds, so mutation i is identical across runs.
#[derive(Debug, Clone)]
pub struct RandomBits {
    pub(crate) value: Vec<u8>,
    pub(crate) unused_bits: u32,
    pub(crate) min_length: i64,
    pub(crate) max_length: i64,
    pub(crate) seed: u64,
    pub(crate) num_mutations: u64,
    pub(crate) step: Option<i64>,
    pub(crate) encoder: BitsEncoder,
    pub(crate) fuzzable: bool,
    pub(crate) name: Option<String>,
}

impl RandomBits {
    #[must_use]
    pub fn new(value: impl Into<Vec<u8>>, min_length: i64, max_length: i64) -> Self {
        RandomBits {
            value: value.into(),
            unused_bits: 0,
            min_length,
            max_length,
            seed: 1235,
            num_mutations: 25,
            step: None,
            encoder: BitsEncoder::Identity,
            fuzzable: true,
            name: None,
        }
    }

    /// Trailing bits of the default value that are not part of it.
    #[must_use]
    pub fn with_unused_bits(mut self, unused_bits: u32) -> Self {
        self.unused_bits = unused_bits;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_num_mutations(mut self, num_mutations: u64) -> Self {
        self.num_mutations = num_mutations;
        self
    }

    /// Walk lengths deterministically instead of drawing them.
    #[must_use]
    pub fn with_step(mut self, step: i64) -> Self {
        self.step = Some(step);
        self
    }

    #[must_use]
    pub fn with_encoder(mut self, encoder: BitsEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn fuzzable(mut self, fuzzable: bool) -> Self {
        self.fuzzable = fuzzable;
        self
    }
}

/// A seeded, reproducible random byte sequence; see [`RandomBits`].
#[derive(Debug, Clone)]
pub struct RandomBytes {
    pub(crate) value: Vec<u8>,
    pub(crate) min_length: i64,
    pub(crate) max_length: i64,
    pub(crate) seed: u64,
    pub(crate) num_mutations: u64,
    pub(crate) step: Option<i64>,
    pub(crate) encoder: StrEncoder,
    pub(crate) fuzzable: bool,
    pub(crate) name: Option<String>,
}

impl RandomBytes {
    #[must_use]
    pub fn new(value: impl Into<Vec<u8>>, min_length: i64, max_length: i64) -> Self {
        RandomBytes {
            value: value.into(),
            min_length,
            max_length,
            seed: 1234,
            num_mutations: 25,
            step: None,
            encoder: StrEncoder::Identity,
            fuzzable: true,
            name: None,
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_num_mutations(mut self, num_mutations: u64) -> Self {
        self.num_mutations = num_mutations;
        self
    }

    #[must_use]
    pub fn with_step(mut self, step: i64) -> Self {
        self.step = Some(step);
        self
    }

    #[must_use]
    pub fn with_encoder(mut self, encoder: StrEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn fuzzable(mut self, fuzzable: bool) -> Self {
        self.fuzzable = fuzzable;
        self
    }
}
