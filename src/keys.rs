use crate::crypto::{hmac_sha3, random_bytes};
use crate::{BakeryError, Result};
use base64::{
    Engine,
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE_NO_PAD},
};
use curve25519_dalek::montgomery::MontgomeryPoint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length in bytes of public and private keys
pub const KEY_LEN: usize = 32;

const SHARED_KEY_CONTEXT: &[u8] = b"bakery third-party caveat key";

/// An X25519 public key identifying a first or third party.
///
/// The text form is standard base64. Parsing also accepts it unpadded, and
/// URL-safe base64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_LEN]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = BakeryError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| BakeryError::InvalidKeyLength)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&STANDARD.encode(self.0))
    }
}

impl FromStr for PublicKey {
    type Err = BakeryError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(s)
            .or_else(|_| STANDARD_NO_PAD.decode(s))
            .or_else(|_| URL_SAFE_NO_PAD.decode(s.trim_end_matches('=')))
            .map_err(|e| BakeryError::InvalidFormat(format!("invalid public key {s:?}: {e}")))?;
        PublicKey::try_from(bytes.as_slice())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An X25519 private key
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey([u8; KEY_LEN]);

impl PrivateKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Derives the matching public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey(MontgomeryPoint::mul_base_clamped(self.0).to_bytes())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

/// A key pair held by a party that mints or discharges caveats
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    public: PublicKey,
    private: PrivateKey,
}

impl KeyPair {
    /// Generates a key pair from the operating system's random source
    pub fn generate() -> Result<Self> {
        let bytes: [u8; KEY_LEN] = random_bytes(KEY_LEN)?
            .try_into()
            .map_err(|_| BakeryError::InvalidKeyLength)?;
        Ok(Self::from_private_key(PrivateKey(bytes)))
    }

    pub fn from_private_key(private: PrivateKey) -> Self {
        Self {
            public: private.public_key(),
            private,
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    /// Derives the symmetric key shared between this key pair and `peer`.
    ///
    /// Both sides of an exchange derive the same key.
    pub fn shared_key(&self, peer: &PublicKey) -> Result<[u8; KEY_LEN]> {
        let shared = MontgomeryPoint(peer.0).mul_clamped(self.private.0).to_bytes();
        if shared == [0u8; KEY_LEN] {
            return Err(BakeryError::CryptoError(
                "public key has low order".to_string(),
            ));
        }
        Ok(hmac_sha3(SHARED_KEY_CONTEXT, &shared))
    }
}
