use std::fmt;

use dcache_types::TypeId;

/// A 128-bit content digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest128([u8; 16]);

impl Digest128 {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lower-case hex, 32 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from 32 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, HasherError> {
        let bytes = hex::decode(s).map_err(|e| HasherError::InvalidHex(e.to_string()))?;
        let arr: [u8; 16] = bytes.try_into().map_err(|b: Vec<u8>| HasherError::InvalidLength {
            expected: 16,
            actual: b.len(),
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for Digest128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest128({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for Digest128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g. `"dcache-type-v1"`) that is
/// prepended to every hash computation, so identical bytes hashed for
/// different purposes never collide.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for entity type names (snapshot store file names).
    pub const TYPE_NAME: Self = Self {
        domain: "dcache-type-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Full 256-bit hash of `data` with domain separation.
    pub fn hash(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    /// 128-bit digest of `data`: the first 16 bytes of [`ContentHasher::hash`].
    pub fn digest128(&self, data: &[u8]) -> Digest128 {
        let full = self.hash(data);
        let mut out = [0u8; 16];
        out.copy_from_slice(&full[..16]);
        Digest128(out)
    }

    /// Stable digest of a type's fully qualified name.
    pub fn type_digest(type_id: &TypeId) -> Digest128 {
        Self::TYPE_NAME.digest128(type_id.qualified_name().as_bytes())
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid digest length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
