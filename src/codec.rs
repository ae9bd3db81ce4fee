//! Third-party caveat encoding.
//!
//! A third-party caveat carries its condition, the discharge root key and
//! the first party's namespace, encrypted for the discharger. Two layouts
//! exist, chosen by the discharger's protocol version:
//!
//! * version 1: a base64 JSON envelope naming both public keys and holding
//!   the sealed secret part;
//! * versions 2 and 3: `version | third-party key prefix (4) |
//!   first-party public key (32) | nonce | ciphertext`. Version 3 adds the
//!   namespace to the secret part.
//!
//! The secret part is MessagePack, sealed with ChaCha20-Poly1305 under the
//! X25519 key shared by the two parties.

use crate::crypto::{open, seal};
use crate::keys::{KEY_LEN, KeyPair, PublicKey};
use crate::location::ThirdPartyInfo;
use crate::namespace::Namespace;
use crate::version::Version;
use crate::{BakeryError, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

const KEY_PREFIX_LEN: usize = 4;
const BINARY_HEADER_LEN: usize = 1 + KEY_PREFIX_LEN + KEY_LEN;

/// The information held by a third-party caveat, as decoded by the discharger
#[derive(Debug, Clone)]
pub struct ThirdPartyCaveatInfo {
    /// The condition to be discharged.
    ///
    /// This is the only field most dischargers need to look at.
    pub condition: Vec<u8>,

    /// Public key of the party that created the caveat
    pub first_party_public_key: PublicKey,

    /// Key pair of the discharger, used to decrypt the caveat
    pub third_party_key_pair: KeyPair,

    /// Root key the discharge macaroon must be minted with
    pub root_key: Vec<u8>,

    /// The full encoded caveat the other fields were decoded from
    pub caveat: Vec<u8>,

    /// Version used to encode the caveat
    pub version: Version,

    /// Id the discharge macaroon is given.
    ///
    /// Differs from `caveat` when the caveat is sent separately from its id.
    pub id: Vec<u8>,

    /// Namespace of the first party that minted the macaroon
    pub namespace: Option<Namespace>,
}

#[derive(Serialize, Deserialize)]
struct SecretPart {
    root_key: Vec<u8>,
    condition: Vec<u8>,
    namespace: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CaveatEnvelope {
    third_party_public_key: PublicKey,
    first_party_public_key: PublicKey,
    sealed: String,
}

/// Encodes a third-party caveat for the party described by `third_party`.
///
/// `key` is the first party's key pair.
pub fn encode_caveat(
    condition: &str,
    root_key: &[u8],
    third_party: &ThirdPartyInfo,
    key: &KeyPair,
    namespace: Option<&Namespace>,
) -> Result<Vec<u8>> {
    let shared = key.shared_key(&third_party.public_key)?;
    let namespace = if third_party.version >= Version::V3 {
        namespace.map(Namespace::to_string)
    } else {
        None
    };
    let secret = rmp_serde::to_vec(&SecretPart {
        root_key: root_key.to_vec(),
        condition: condition.as_bytes().to_vec(),
        namespace,
    })
    .map_err(|e| BakeryError::InvalidFormat(e.to_string()))?;
    let sealed = seal(&shared, &secret)?;

    if third_party.version < Version::V2 {
        let envelope = CaveatEnvelope {
            third_party_public_key: third_party.public_key,
            first_party_public_key: *key.public_key(),
            sealed: STANDARD.encode(sealed),
        };
        let json = serde_json::to_vec(&envelope)
            .map_err(|e| BakeryError::InvalidFormat(e.to_string()))?;
        return Ok(STANDARD.encode(json).into_bytes());
    }

    let version_byte = if third_party.version >= Version::V3 { 3 } else { 2 };
    let mut caveat = Vec::with_capacity(BINARY_HEADER_LEN + sealed.len());
    caveat.push(version_byte);
    caveat.extend_from_slice(&third_party.public_key.as_bytes()[..KEY_PREFIX_LEN]);
    caveat.extend_from_slice(key.public_key().as_bytes());
    caveat.extend_from_slice(&sealed);
    Ok(caveat)
}

/// Decodes a third-party caveat with the discharger's key pair
pub fn decode_caveat(key: &KeyPair, caveat: &[u8]) -> Result<ThirdPartyCaveatInfo> {
    match caveat {
        [] => Err(BakeryError::InvalidFormat(
            "empty third party caveat".to_string(),
        )),
        [2 | 3, ..] => decode_binary(key, caveat),
        [b'e', ..] => decode_envelope(key, caveat),
        [other, ..] => Err(BakeryError::InvalidFormat(format!(
            "caveat has unsupported version {other}"
        ))),
    }
}

fn decode_binary(key: &KeyPair, caveat: &[u8]) -> Result<ThirdPartyCaveatInfo> {
    if caveat.len() < BINARY_HEADER_LEN {
        return Err(BakeryError::InvalidFormat(
            "caveat id too short".to_string(),
        ));
    }
    let version = Version(u32::from(caveat[0]));
    let (prefix, rest) = caveat[1..].split_at(KEY_PREFIX_LEN);
    let (first_party, sealed) = rest.split_at(KEY_LEN);

    if prefix != &key.public_key().as_bytes()[..KEY_PREFIX_LEN] {
        return Err(BakeryError::CryptoError("public key mismatch".to_string()));
    }
    let first_party_public_key = PublicKey::try_from(first_party)?;

    decode_secret(key, caveat, version, first_party_public_key, sealed)
}

fn decode_envelope(key: &KeyPair, caveat: &[u8]) -> Result<ThirdPartyCaveatInfo> {
    let json = STANDARD
        .decode(caveat)
        .map_err(|e| BakeryError::DeserializationError(e.to_string()))?;
    let envelope: CaveatEnvelope = serde_json::from_slice(&json)
        .map_err(|e| BakeryError::DeserializationError(e.to_string()))?;

    if envelope.third_party_public_key != *key.public_key() {
        return Err(BakeryError::CryptoError("public key mismatch".to_string()));
    }
    let sealed = STANDARD
        .decode(envelope.sealed)
        .map_err(|e| BakeryError::DeserializationError(e.to_string()))?;

    decode_secret(
        key,
        caveat,
        Version::V1,
        envelope.first_party_public_key,
        &sealed,
    )
}

fn decode_secret(
    key: &KeyPair,
    caveat: &[u8],
    version: Version,
    first_party_public_key: PublicKey,
    sealed: &[u8],
) -> Result<ThirdPartyCaveatInfo> {
    let shared = key.shared_key(&first_party_public_key)?;
    let secret: SecretPart = rmp_serde::from_slice(&open(&shared, sealed)?)
        .map_err(|e| BakeryError::DeserializationError(e.to_string()))?;

    let namespace = if version >= Version::V3 {
        secret
            .namespace
            .as_deref()
            .map(str::parse::<Namespace>)
            .transpose()?
    } else {
        Some(Namespace::legacy())
    };

    Ok(ThirdPartyCaveatInfo {
        condition: secret.condition,
        first_party_public_key,
        third_party_key_pair: key.clone(),
        root_key: secret.root_key,
        caveat: caveat.to_vec(),
        version,
        id: Vec::new(),
        namespace,
    })
}
