//! Cryptographic helpers used by encoders and calculated fields: block
//! cipher encoders, digest algorithms and 32-bit checksums.
//!
//! Key material may come from a fixed buffer or from a provider callback
//! invoked once per encode, so a rebuilt tree sees the same key sequence
//! only when the provider is deterministic.

use crate::error::{EncodingError, ModelError};
use cipher::block_padding::NoPadding;
use cipher::{BlockModeEncrypt, KeyInit, KeyIvInit};
use sha2::Digest as _;
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Block ciphers
// ---------------------------------------------------------------------------

/// Supported block cipher algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgorithm {
    Aes128,
    Aes192,
    Aes256,
    Des,
    TripleDes,
}

impl CipherAlgorithm {
    /// Key size in bytes.
    #[must_use]
    pub fn key_len(self) -> usize {
        match self {
            CipherAlgorithm::Aes128 => 16,
            CipherAlgorithm::Aes192 => 24,
            CipherAlgorithm::Aes256 => 32,
            CipherAlgorithm::Des => 8,
            CipherAlgorithm::TripleDes => 24,
        }
    }

    /// Block size in bytes.
    #[must_use]
    pub fn block_len(self) -> usize {
        match self {
            CipherAlgorithm::Aes128 | CipherAlgorithm::Aes192 | CipherAlgorithm::Aes256 => 16,
            CipherAlgorithm::Des | CipherAlgorithm::TripleDes => 8,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            CipherAlgorithm::Aes128 => "aes128",
            CipherAlgorithm::Aes192 => "aes192",
            CipherAlgorithm::Aes256 => "aes256",
            CipherAlgorithm::Des => "des",
            CipherAlgorithm::TripleDes => "3des",
        }
    }
}

/// Cipher chaining mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    Cbc,
    Ecb,
}

/// Where the key comes from.
#[derive(Clone)]
pub enum KeySource {
    /// A fixed key, validated at construction.
    Fixed(Vec<u8>),
    /// A callback invoked once per encode.
    Provider(Arc<dyn Fn() -> Vec<u8> + Send + Sync>),
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Fixed(k) => write!(f, "KeySource::Fixed({} bytes)", k.len()),
            KeySource::Provider(_) => write!(f, "KeySource::Provider"),
        }
    }
}

/// Plaintext padding up to the block size.
#[derive(Clone)]
pub enum CipherPadding {
    /// Zero bytes (the default).
    Zero,
    /// User function from (data, block_len) to padded data.
    Func(Arc<dyn Fn(&[u8], usize) -> Vec<u8> + Send + Sync>),
}

impl fmt::Debug for CipherPadding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherPadding::Zero => write!(f, "CipherPadding::Zero"),
            CipherPadding::Func(_) => write!(f, "CipherPadding::Func"),
        }
    }
}

/// A configured block cipher used as a string encoder.
#[derive(Debug, Clone)]
pub struct BlockCipher {
    algo: CipherAlgorithm,
    mode: CipherMode,
    key: KeySource,
    iv: Vec<u8>,
    padding: CipherPadding,
}

impl BlockCipher {
    /// Configure a cipher; fixed keys are validated here.
    pub fn new(algo: CipherAlgorithm, mode: CipherMode, key: KeySource) -> Result<Self, ModelError> {
        if let KeySource::Fixed(ref k) = key {
            if k.len() != algo.key_len() {
                return Err(ModelError::invalid(format!(
                    "{} key must be {} bytes, got {}",
                    algo.tag(),
                    algo.key_len(),
                    k.len()
                )));
            }
        }
        Ok(BlockCipher {
            algo,
            mode,
            key,
            iv: vec![0; algo.block_len()],
            padding: CipherPadding::Zero,
        })
    }

    /// Use a fixed IV instead of the default all-zero one (CBC only).
    pub fn with_iv(mut self, iv: Vec<u8>) -> Result<Self, ModelError> {
        if iv.len() != self.algo.block_len() {
            return Err(ModelError::invalid(format!(
                "{} IV must be {} bytes, got {}",
                self.algo.tag(),
                self.algo.block_len(),
                iv.len()
            )));
        }
        self.iv = iv;
        Ok(self)
    }

    /// Replace the zero padding with a user function.
    #[must_use]
    pub fn with_padding(mut self, padding: CipherPadding) -> Self {
        self.padding = padding;
        self
    }

    pub(crate) fn tag(&self) -> String {
        let mode = match self.mode {
            CipherMode::Cbc => "cbc",
            CipherMode::Ecb => "ecb",
        };
        format!("{}-{}", self.algo.tag(), mode)
    }

    /// Pad and encrypt `data`. The key provider, if any, is consulted
    /// exactly once.
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, EncodingError> {
        let block = self.algo.block_len();
        let padded = match &self.padding {
            CipherPadding::Zero => {
                let mut out = data.to_vec();
                let rem = out.len() % block;
                if rem != 0 {
                    out.resize(out.len() + block - rem, 0);
                }
                out
            }
            CipherPadding::Func(f) => f(data, block),
        };
        if padded.len() % block != 0 {
            return Err(EncodingError::Cipher(format!(
                "padded plaintext is {} bytes, not a multiple of the {} byte block",
                padded.len(),
                block
            )));
        }
        let mut key = match &self.key {
            KeySource::Fixed(k) => k.clone(),
            KeySource::Provider(p) => p(),
        };
        if key.len() != self.algo.key_len() {
            log::warn!(
                "key provider returned {} bytes for {}, resizing to {}",
                key.len(),
                self.algo.tag(),
                self.algo.key_len()
            );
            key.resize(self.algo.key_len(), 0);
        }
        self.dispatch(&key, &padded)
    }

    fn dispatch(&self, key: &[u8], padded: &[u8]) -> Result<Vec<u8>, EncodingError> {
        macro_rules! run {
            ($cipher:ty) => {
                match self.mode {
                    CipherMode::Cbc => <cbc::Encryptor<$cipher>>::new_from_slices(key, &self.iv)
                        .map_err(|e| EncodingError::Cipher(e.to_string()))?
                        .encrypt_padded_vec::<NoPadding>(padded),
                    CipherMode::Ecb => <ecb::Encryptor<$cipher>>::new_from_slice(key)
                        .map_err(|e| EncodingError::Cipher(e.to_string()))?
                        .encrypt_padded_vec::<NoPadding>(padded),
                }
            };
        }
        let out = match self.algo {
            CipherAlgorithm::Aes128 => run!(aes::Aes128),
            CipherAlgorithm::Aes192 => run!(aes::Aes192),
            CipherAlgorithm::Aes256 => run!(aes::Aes256),
            CipherAlgorithm::Des => run!(des::Des),
            CipherAlgorithm::TripleDes => run!(des::TdesEde3),
        };
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Digests
// ---------------------------------------------------------------------------

/// Digest algorithm backing a Hash calculated field.
#[derive(Clone)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    /// User digest with an explicit output width in bits.
    Custom {
        func: Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>,
        digest_bits: usize,
    },
}

impl fmt::Debug for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashAlgorithm::{}", self.tag())
    }
}

impl HashAlgorithm {
    /// Digest width in bits.
    #[must_use]
    pub fn digest_bits(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => 128,
            HashAlgorithm::Sha1 => 160,
            HashAlgorithm::Sha224 => 224,
            HashAlgorithm::Sha256 => 256,
            HashAlgorithm::Sha384 => 384,
            HashAlgorithm::Sha512 => 512,
            HashAlgorithm::Custom { digest_bits, .. } => *digest_bits,
        }
    }

    /// Digest of `data`.
    #[must_use]
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Md5 => md5::Md5::digest(data).to_vec(),
            HashAlgorithm::Sha1 => sha1::Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha224 => sha2::Sha224::digest(data).to_vec(),
            HashAlgorithm::Sha256 => sha2::Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => sha2::Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => sha2::Sha512::digest(data).to_vec(),
            HashAlgorithm::Custom { func, .. } => func(data),
        }
    }

    pub(crate) fn tag(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha224 => "sha224",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Custom { .. } => "custom",
        }
    }
}

// ---------------------------------------------------------------------------
// Checksums
// ---------------------------------------------------------------------------

/// Checksum algorithm backing a Checksum calculated field. The result is
/// truncated to 32 bits.
#[derive(Clone)]
pub enum ChecksumAlgorithm {
    /// IEEE CRC-32 (polynomial 0xEDB88320, initial/final XOR 0xFFFFFFFF).
    Crc32,
    Adler32,
    Custom(Arc<dyn Fn(&[u8]) -> u32 + Send + Sync>),
}

impl fmt::Debug for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChecksumAlgorithm::{}", self.tag())
    }
}

impl ChecksumAlgorithm {
    /// Checksum of `data`.
    #[must_use]
    pub fn compute(&self, data: &[u8]) -> u32 {
        match self {
            ChecksumAlgorithm::Crc32 => crc32fast::hash(data),
            ChecksumAlgorithm::Adler32 => {
                let mut hasher = adler2::Adler32::new();
                hasher.write_slice(data);
                hasher.checksum()
            }
            ChecksumAlgorithm::Custom(f) => f(data),
        }
    }

    pub(crate) fn tag(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Crc32 => "crc32",
            ChecksumAlgorithm::Adler32 => "adler32",
            ChecksumAlgorithm::Custom(_) => "custom",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_check_value() {
        assert_eq!(ChecksumAlgorithm::Crc32.compute(b"123456789"), 0xcbf4_3926);
    }

    #[test]
    fn adler32_check_value() {
        // Known Adler-32 of "Wikipedia".
        assert_eq!(ChecksumAlgorithm::Adler32.compute(b"Wikipedia"), 0x11e6_0398);
    }

    #[test]
    fn digest_widths_match_output() {
        for algo in [
            HashAlgorithm::Md5,
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha224,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
        ] {
            assert_eq!(algo.digest(b"abc").len() * 8, algo.digest_bits());
        }
    }

    #[test]
    fn md5_known_digest() {
        assert_eq!(
            hex::encode(HashAlgorithm::Md5.digest(b"kitty")),
            "cd880b726e0a0dbd4237f10d15da46f4"
        );
    }

    #[test]
    fn fixed_key_must_match_algorithm() {
        let err = BlockCipher::new(
            CipherAlgorithm::Aes128,
            CipherMode::Cbc,
            KeySource::Fixed(vec![0; 5]),
        );
        assert!(err.is_err());
    }

    #[test]
    fn zero_padding_and_block_output() {
        let cipher = BlockCipher::new(
            CipherAlgorithm::Aes128,
            CipherMode::Ecb,
            KeySource::Fixed(vec![0x11; 16]),
        )
        .expect("valid cipher");
        let out = cipher.encrypt(b"hello").expect("encrypts");
        assert_eq!(out.len(), 16);
        // Deterministic for a fixed key.
        assert_eq!(out, cipher.encrypt(b"hello").expect("encrypts"));
    }

    #[test]
    fn provider_called_per_encode() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let cipher = BlockCipher::new(
            CipherAlgorithm::Des,
            CipherMode::Ecb,
            KeySource::Provider(Arc::new(move || {
                calls2.fetch_add(1, Ordering::SeqCst);
                vec![0x22; 8]
            })),
        )
        .expect("valid cipher");
        cipher.encrypt(b"12345678").expect("encrypts");
        cipher.encrypt(b"12345678").expect("encrypts");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
