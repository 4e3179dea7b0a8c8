//! Calculated field declarations: fields whose rendered value is a pure
//! function of another node's current rendering.
//!
//! Each one names its dependency; resolution scans the enclosing containers
//! outwards and fails template compilation with `UnresolvedDependency` when
//! nothing matches. Calculated fields are recomputed on every render and
//! are not fuzzable unless explicitly configured.

use crate::bits::Bits;
use crate::crypto::{ChecksumAlgorithm, HashAlgorithm};
use crate::encoder::{BitsEncoder, IntEncoder, StrEncoder};
use std::fmt;
use std::sync::Arc;

/// Renders exactly what the dependency rendered. In-render fallback:
/// empty bits.
#[derive(Debug, Clone)]
pub struct CloneOf {
    pub(crate) depends_on: String,
    pub(crate) encoder: BitsEncoder,
    pub(crate) name: Option<String>,
}

impl CloneOf {
    #[must_use]
    pub fn new(depends_on: impl Into<String>) -> Self {
        CloneOf {
            depends_on: depends_on.into(),
            encoder: BitsEncoder::Identity,
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
}

/// A user function over the dependency's rendered bits.
#[derive(Clone)]
pub struct CalculatedBits {
    pub(crate) depends_on: String,
    pub(crate) func: Arc<dyn Fn(&Bits) -> Bits + Send + Sync>,
    pub(crate) encoder: BitsEncoder,
    pub(crate) name: Option<String>,
}

impl fmt::Debug for CalculatedBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalculatedBits")
            .field("depends_on", &self.depends_on)
            .finish_non_exhaustive()
    }
}

impl CalculatedBits {
    pub fn new(
        depends_on: impl Into<String>,
        func: impl Fn(&Bits) -> Bits + Send + Sync + 'static,
    ) -> Self {
        CalculatedBits {
            depends_on: depends_on.into(),
            func: Arc::new(func),
            encoder: BitsEncoder::Identity,
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
}

/// A user function over the dependency's rendered bytes.
#[derive(Clone)]
pub struct CalculatedStr {
    pub(crate) depends_on: String,
    pub(crate) func: Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>,
    pub(crate) encoder: StrEncoder,
    pub(crate) name: Option<String>,
}

impl fmt::Debug for CalculatedStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalculatedStr")
            .field("depends_on", &self.depends_on)
            .finish_non_exhaustive()
    }
}

impl CalculatedStr {
    pub fn new(
        depends_on: impl Into<String>,
        func: impl Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    ) -> Self {
        CalculatedStr {
            depends_on: depends_on.into(),
            func: Arc::new(func),
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

/// A fixed-width digest of the dependency's rendered bytes. In-render
/// fallback: zero bits of the digest width.
#[derive(Debug, Clone)]
pub struct HashField {
    pub(crate) depends_on: String,
    pub(crate) algorithm: HashAlgorithm,
    pub(crate) encoder: StrEncoder,
    pub(crate) name: Option<String>,
}

impl HashField {
    #[must_use]
    pub fn new(depends_on: impl Into<String>, algorithm: HashAlgorithm) -> Self {
        HashField {
            depends_on: depends_on.into(),
            algorithm,
            encoder: StrEncoder::Identity,
            name: None,
        }
    }

    #[must_use]
    pub fn md5(depends_on: impl Into<String>) -> Self {
        HashField::new(depends_on, HashAlgorithm::Md5)
    }

    #[must_use]
    pub fn sha1(depends_on: impl Into<String>) -> Self {
        HashField::new(depends_on, HashAlgorithm::Sha1)
    }

    #[must_use]
    pub fn sha224(depends_on: impl Into<String>) -> Self {
        HashField::new(depends_on, HashAlgorithm::Sha224)
    }

    #[must_use]
    pub fn sha256(depends_on: impl Into<String>) -> Self {
        HashField::new(depends_on, HashAlgorithm::Sha256)
    }

    #[must_use]
    pub fn sha384(depends_on: impl Into<String>) -> Self {
        HashField::new(depends_on, HashAlgorithm::Sha384)
    }

    #[must_use]
    pub fn sha512(depends_on: impl Into<String>) -> Self {
        HashField::new(depends_on, HashAlgorithm::Sha512)
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

/// Unit a size field counts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SizeUnit {
    Bits,
    Bytes,
}

/// Length of the dependency's rendering, held in a BitField of the given
/// width and saturated to its range. In-render fallback: zero bits of the
/// same width, which makes inclusive sizes self-consistent.
#[derive(Debug, Clone)]
pub struct Size {
    pub(crate) depends_on: String,
    pub(crate) length: u32,
    pub(crate) unit: SizeUnit,
    pub(crate) encoder: IntEncoder,
    pub(crate) fuzzable: bool,
    pub(crate) name: Option<String>,
}

impl Size {
    /// Size in bytes (rendered bit length / 8), the common wire format.
    #[must_use]
    pub fn new(depends_on: impl Into<String>, length: u32) -> Self {
        Size {
            depends_on: depends_on.into(),
            length,
            unit: SizeUnit::Bytes,
            encoder: IntEncoder::Raw,
            fuzzable: false,
            name: None,
        }
    }

    /// Size in bits.
    #[must_use]
    pub fn in_bits(depends_on: impl Into<String>, length: u32) -> Self {
        let mut s = Size::new(depends_on, length);
        s.unit = SizeUnit::Bits;
        s
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

    /// Also fuzz the size value itself (off-range lengths and the like).
    #[must_use]
    pub fn fuzzable(mut self, fuzzable: bool) -> Self {
        self.fuzzable = fuzzable;
        self
    }
}

/// Number of rendered fields inside the dependency; empty conditional
/// branches count zero.
#[derive(Debug, Clone)]
pub struct ElementCount {
    pub(crate) depends_on: String,
    pub(crate) length: u32,
    pub(crate) encoder: IntEncoder,
    pub(crate) fuzzable: bool,
    pub(crate) name: Option<String>,
}

impl ElementCount {
    #[must_use]
    pub fn new(depends_on: impl Into<String>, length: u32) -> Self {
        ElementCount {
            depends_on: depends_on.into(),
            length,
            encoder: IntEncoder::Raw,
            fuzzable: false,
            name: None,
        }
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

/// Position of the dependency among its enclosing container's rendered
/// fields; 0 with no encloser, the list length when not rendered.
#[derive(Debug, Clone)]
pub struct IndexOf {
    pub(crate) depends_on: String,
    pub(crate) length: u32,
    pub(crate) encoder: IntEncoder,
    pub(crate) fuzzable: bool,
    pub(crate) name: Option<String>,
}

impl IndexOf {
    #[must_use]
    pub fn new(depends_on: impl Into<String>, length: u32) -> Self {
        IndexOf {
            depends_on: depends_on.into(),
            length,
            encoder: IntEncoder::Raw,
            fuzzable: false,
            name: None,
        }
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

/// 32-bit checksum of the dependency's rendered bytes.
#[derive(Debug, Clone)]
pub struct Checksum {
    pub(crate) depends_on: String,
    pub(crate) length: u32,
    pub(crate) algorithm: ChecksumAlgorithm,
    pub(crate) encoder: IntEncoder,
    pub(crate) fuzzable: bool,
    pub(crate) name: Option<String>,
}

impl Checksum {
    #[must_use]
    pub fn new(depends_on: impl Into<String>, length: u32) -> Self {
        Checksum {
            depends_on: depends_on.into(),
            length,
            algorithm: ChecksumAlgorithm::Crc32,
            encoder: IntEncoder::Raw,
            fuzzable: false,
            name: None,
        }
    }

    #[must_use]
    pub fn with_algorithm(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.algorithm = algorithm;
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
