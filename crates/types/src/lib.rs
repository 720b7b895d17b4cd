//! Validated value types shared across the provenance crates.
//!
//! [`ContentHash`] is the canonical form of a SHA-256 digest. Manifests, access logs and
//! the file layer all exchange digests through it, so a malformed hash is rejected where
//! it enters rather than where it is compared.

/// Errors that can occur when parsing a content hash.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HashError {
    /// The input was not 64 characters long
    #[error("hash must be 64 hex characters, got {0}")]
    InvalidLength(usize),

    /// The input contained characters outside `0-9a-f`
    #[error("hash must be lowercase hex: {0}")]
    InvalidCharacters(String),
}

/// SHA-256 content digest, stored as 64 lowercase hex characters.
///
/// Once constructed the value is always canonical, so two hashes compare equal
/// exactly when their digests do.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hex length of a SHA-256 digest.
    pub const HEX_LEN: usize = 64;

    /// Wraps raw digest bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Validates a hex digest.
    ///
    /// Uppercase input is rejected rather than normalised so that recorded
    /// manifests stay byte-for-byte comparable.
    pub fn parse(input: &str) -> Result<Self, HashError> {
        if input.len() != Self::HEX_LEN {
            return Err(HashError::InvalidLength(input.len()));
        }
        if !input
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(HashError::InvalidCharacters(input.to_owned()));
        }
        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        ContentHash::parse(&s).map_err(serde::de::Error::custom)
    }
}
