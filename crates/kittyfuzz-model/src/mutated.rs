//! Flip-style fields: sliding windows of inverted bits or bytes over a
//! fixed default value.

use crate::encoder::{BitsEncoder, StrEncoder};

/// Every position of a window of `num_bits` flipped bits over the value;
/// `num_mutations == bit_len − num_bits + 1`.
#[derive(Debug, Clone)]
pub struct BitFlip {
    pub(crate) value: Vec<u8>,
    pub(crate) num_bits: usize,
    pub(crate) encoder: BitsEncoder,
    pub(crate) fuzzable: bool,
    pub(crate) name: Option<String>,
}

impl BitFlip {
    #[must_use]
    pub fn new(value: impl Into<Vec<u8>>, num_bits: usize) -> Self {
        BitFlip {
            value: value.into(),
            num_bits,
            encoder: BitsEncoder::Identity,
            fuzzable: true,
            name: None,
        }
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

/// Concatenated [`BitFlip`] libraries for several window sizes
/// (default 1, 2, 3, 4).
#[derive(Debug, Clone)]
pub struct BitFlips {
    pub(crate) value: Vec<u8>,
    pub(crate) bits_range: Vec<usize>,
    pub(crate) encoder: BitsEncoder,
    pub(crate) fuzzable: bool,
    pub(crate) name: Option<String>,
}

impl BitFlips {
    #[must_use]
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        BitFlips {
            value: value.into(),
            bits_range: vec![1, 2, 3, 4],
            encoder: BitsEncoder::Identity,
            fuzzable: true,
            name: None,
        }
    }

    #[must_use]
    pub fn with_range(mut self, bits_range: Vec<usize>) -> Self {
        self.bits_range = bits_range;
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

/// Every position of a window of `num_bytes` inverted bytes over the
/// value; `num_mutations == byte_len − num_bytes + 1`.
#[derive(Debug, Clone)]
pub struct ByteFlip {
    pub(crate) value: Vec<u8>,
    pub(crate) num_bytes: usize,
    pub(crate) encoder: StrEncoder,
    pub(crate) fuzzable: bool,
    pub(crate) name: Option<String>,
}

impl ByteFlip {
    #[must_use]
    pub fn new(value: impl Into<Vec<u8>>, num_bytes: usize) -> Self {
        ByteFlip {
            value: value.into(),
            num_bytes,
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

/// Concatenated [`ByteFlip`] libraries for several window sizes
/// (default 1, 2, 4).
#[derive(Debug, Clone)]
pub struct ByteFlips {
    pub(crate) value: Vec<u8>,
    pub(crate) bytes_range: Vec<usize>,
    pub(crate) encoder: StrEncoder,
    pub(crate) fuzzable: bool,
    pub(crate) name: Option<String>,
}

impl ByteFlips {
    #[must_use]
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        ByteFlips {
            value: value.into(),
            bytes_range: vec![1, 2, 4],
            encoder: StrEncoder::Identity,
            fuzzable: true,
            name: None,
        }
    }

    #[must_use]
    pub fn with_range(mut self, bytes_range: Vec<usize>) -> Self {
        self.bytes_range = bytes_range;
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
