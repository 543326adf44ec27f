use std::fmt::{Display, Formatter};

use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

pub type HmacSha256 = Hmac<Sha256>;

/// One-way digest of a national identity number. Only this is ever stored;
/// the plaintext number is dropped as soon as it has been hashed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityHash(String);

impl IdentityHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for IdentityHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keyed hasher for identity numbers (HMAC-SHA256, hex-encoded).
///
/// Keying the digest means a leaked voter table cannot be reversed by
/// enumerating the (small) space of valid identity numbers.
#[derive(Clone)]
pub struct IdentityHasher {
    mac: HmacSha256,
}

impl IdentityHasher {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            mac: HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size"),
        }
    }

    /// Hash an identity number. Whitespace is not significant, so the
    /// printed `1234 1234 1234` grouping hashes like the bare digits.
    pub fn hash(&self, identity: &str) -> IdentityHash {
        let mut mac = self.mac.clone();
        for group in identity.split_whitespace() {
            mac.update(group.as_bytes());
        }
        IdentityHash(HEXLOWER.encode(&mac.finalize().into_bytes()))
    }
}
