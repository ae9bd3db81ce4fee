//! Locating third parties.
//!
//! A third-party caveat is encrypted for the discharger's public key, so a
//! minting service must find that key from the caveat's location. Local
//! caveats embed the key in the location string itself; every other
//! location is resolved through a [`ThirdPartyLocator`].

use crate::caveat::Caveat;
use crate::keys::PublicKey;
use crate::version::Version;
use crate::{BakeryError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio_util::sync::CancellationToken;

const LOCAL_PREFIX: &str = "local ";

/// The location recorded in a macaroon for caveats discharged locally
pub const LOCAL_LOCATION: &str = "local";

/// Public key and protocol version of a third party
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThirdPartyInfo {
    pub public_key: PublicKey,
    pub version: Version,
}

/// Resolves third-party locations to their public key and version
#[async_trait]
pub trait ThirdPartyLocator: Send + Sync {
    async fn third_party_info(
        &self,
        ctx: &CancellationToken,
        location: &str,
    ) -> Result<ThirdPartyInfo>;
}

/// An in-memory [`ThirdPartyLocator`].
///
/// Locations are compared with any trailing `/` removed.
#[derive(Debug, Default)]
pub struct ThirdPartyStore {
    infos: RwLock<HashMap<String, ThirdPartyInfo>>,
}

impl ThirdPartyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the info for a third party at `location`
    pub fn add_info(&self, location: &str, info: ThirdPartyInfo) {
        let mut infos = self
            .infos
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        infos.insert(canonical_location(location).to_string(), info);
    }
}

#[async_trait]
impl ThirdPartyLocator for ThirdPartyStore {
    async fn third_party_info(
        &self,
        _ctx: &CancellationToken,
        location: &str,
    ) -> Result<ThirdPartyInfo> {
        let infos = self
            .infos
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        infos
            .get(canonical_location(location))
            .copied()
            .ok_or_else(|| BakeryError::ThirdPartyNotFound(location.to_string()))
    }
}

fn canonical_location(location: &str) -> &str {
    location.trim_end_matches('/')
}

/// Encodes the location of a caveat discharged locally with `key`.
///
/// Versions before 2 omit the version so that older clients can still parse
/// the location.
///
/// # Example
/// ```
/// use bakery::keys::PublicKey;
/// use bakery::location::encode_local_location;
/// use bakery::Version;
///
/// let key = PublicKey::from_bytes([0u8; 32]);
/// assert_eq!(encode_local_location(&key, Version::V1), format!("local {key}"));
/// assert_eq!(encode_local_location(&key, Version::V3), format!("local 3 {key}"));
/// ```
pub fn encode_local_location(key: &PublicKey, version: Version) -> String {
    if version < Version::V2 {
        format!("{LOCAL_PREFIX}{key}")
    } else {
        format!("{LOCAL_PREFIX}{version} {key}")
    }
}

/// Decodes a location produced by [`encode_local_location`].
///
/// Returns `None` for anything that is not a well-formed local location:
/// a missing `local ` prefix, the wrong number of fields, a non-numeric
/// version or an unparseable key.
pub fn decode_local_location(location: &str) -> Option<ThirdPartyInfo> {
    let rest = location.strip_prefix(LOCAL_PREFIX)?;
    let fields: Vec<&str> = rest.split_whitespace().collect();

    let (version, key) = match fields.as_slice() {
        [version, key] => (Version(version.parse().ok()?), key),
        [key] => (Version::V1, key),
        _ => return None,
    };

    Some(ThirdPartyInfo {
        public_key: key.parse().ok()?,
        version,
    })
}

/// Returns a third-party caveat that is discharged locally by whoever holds
/// the private key for `key`.
///
/// The caveat has no condition; it is discharged with the condition `true`.
pub fn local_third_party_caveat(key: &PublicKey, version: Version) -> Caveat {
    Caveat {
        condition: String::new(),
        namespace: None,
        location: Some(encode_local_location(key, version)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PublicKey {
        PublicKey::from_bytes([42u8; 32])
    }

    #[test]
    fn test_encode_legacy_omits_version() {
        assert_eq!(
            encode_local_location(&key(), Version::V0),
            format!("local {}", key())
        );
        assert_eq!(
            encode_local_location(&key(), Version::V1),
            format!("local {}", key())
        );
    }

    #[test]
    fn test_encode_includes_version() {
        assert_eq!(
            encode_local_location(&key(), Version::V2),
            format!("local 2 {}", key())
        );
    }

    #[test]
    fn test_decode_versioned() {
        let info = decode_local_location(&format!("local 2 {}", key())).unwrap();
        assert_eq!(info.public_key, key());
        assert_eq!(info.version, Version::V2);
    }

    #[test]
    fn test_decode_unversioned_defaults_to_v1() {
        let info = decode_local_location(&format!("local {}", key())).unwrap();
        assert_eq!(info.version, Version::V1);
    }

    #[test]
    fn test_decode_legacy_encoding_yields_v1() {
        let loc = encode_local_location(&key(), Version::V0);
        assert_eq!(decode_local_location(&loc).unwrap().version, Version::V1);
    }

    #[test]
    fn test_decode_not_local() {
        assert_eq!(decode_local_location("not-local something"), None);
        assert_eq!(decode_local_location("https://auth.example.com"), None);
        assert_eq!(decode_local_location("local"), None);
    }

    #[test]
    fn test_decode_malformed() {
        assert_eq!(decode_local_location("local badkey"), None);
        assert_eq!(decode_local_location(&format!("local x {}", key())), None);
        assert_eq!(decode_local_location(&format!("local -1 {}", key())), None);
        assert_eq!(
            decode_local_location(&format!("local 2 {} extra", key())),
            None
        );
        assert_eq!(decode_local_location("local "), None);
    }

    #[test]
    fn test_decode_tolerates_extra_whitespace() {
        let info = decode_local_location(&format!("local  3   {}", key())).unwrap();
        assert_eq!(info.version, Version::V3);
    }

    #[test]
    fn test_local_third_party_caveat() {
        let caveat = local_third_party_caveat(&key(), Version::V3);
        assert!(caveat.is_third_party());
        assert!(caveat.condition.is_empty());
        assert_eq!(
            caveat.location,
            Some(encode_local_location(&key(), Version::V3))
        );
    }

    #[tokio::test]
    async fn test_store_lookup_trims_trailing_slash() {
        let store = ThirdPartyStore::new();
        let info = ThirdPartyInfo {
            public_key: key(),
            version: Version::V2,
        };
        store.add_info("https://auth.example.com/", info);

        let ctx = CancellationToken::new();
        assert_eq!(
            store
                .third_party_info(&ctx, "https://auth.example.com")
                .await
                .unwrap(),
            info
        );
    }

    #[tokio::test]
    async fn test_store_unknown_location() {
        let store = ThirdPartyStore::new();
        let ctx = CancellationToken::new();

        assert_eq!(
            store.third_party_info(&ctx, "https://nowhere").await,
            Err(BakeryError::ThirdPartyNotFound("https://nowhere".into()))
        );
    }
}
