use crate::caveat::Caveat;
use crate::codec::encode_caveat;
use crate::crypto::random_bytes;
use crate::keys::KeyPair;
use crate::location::{LOCAL_LOCATION, ThirdPartyLocator, decode_local_location};
use crate::namespace::Namespace;
use crate::raw::{RawCaveat, RawMacaroon};
use crate::version::Version;
use crate::{BakeryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Length of the root keys drawn for new third-party caveats
const CAVEAT_ROOT_KEY_LEN: usize = 24;

/// A macaroon together with the bakery information needed to extend it.
///
/// Besides the underlying [`RawMacaroon`] this records the protocol version
/// the macaroon was minted for, the first party's namespace and, for
/// version 3 third-party caveats, the encoded caveat for each short caveat id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Macaroon {
    raw: RawMacaroon,
    version: Version,
    namespace: Option<Namespace>,
    caveat_data: BTreeMap<Vec<u8>, Vec<u8>>,

    /// Prefix for ids of new third-party caveats; only meaningful while
    /// building a discharge.
    #[serde(skip)]
    caveat_id_prefix: Vec<u8>,
}

impl Macaroon {
    /// Mints a new macaroon.
    ///
    /// Fails if `version` is newer than [`Version::LATEST`].
    pub fn new(
        root_key: &[u8],
        id: impl Into<Vec<u8>>,
        location: Option<impl Into<String>>,
        version: Version,
        namespace: Option<Namespace>,
    ) -> Result<Self> {
        if version > Version::LATEST {
            return Err(BakeryError::InvalidFormat(format!(
                "unsupported bakery version {version}"
            )));
        }

        Ok(Self {
            raw: RawMacaroon::new(root_key, id, location),
            version,
            namespace,
            caveat_data: BTreeMap::new(),
            caveat_id_prefix: Vec::new(),
        })
    }

    pub fn raw(&self) -> &RawMacaroon {
        &self.raw
    }

    pub fn into_raw(self) -> RawMacaroon {
        self.raw
    }

    pub fn id(&self) -> &[u8] {
        &self.raw.identifier
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn namespace(&self) -> Option<&Namespace> {
        self.namespace.as_ref()
    }

    /// Returns the caveats of the underlying macaroon, in order
    pub fn caveats(&self) -> &[RawCaveat] {
        &self.raw.caveats
    }

    /// Returns the encoded caveat stored for a short third-party caveat id
    pub fn caveat_data(&self, caveat_id: &[u8]) -> Option<&[u8]> {
        self.caveat_data.get(caveat_id).map(Vec::as_slice)
    }

    pub(crate) fn set_caveat_id_prefix(&mut self, prefix: Vec<u8>) {
        self.caveat_id_prefix = prefix;
    }

    /// Adds a caveat to the macaroon.
    ///
    /// First-party caveats are resolved through the macaroon's namespace.
    /// Third-party caveats are encrypted for the discharger, which is found
    /// from a local location or else through `locator`; `key` is this
    /// party's key pair and is required for them.
    pub async fn add_caveat(
        &mut self,
        ctx: &CancellationToken,
        caveat: Caveat,
        key: Option<&KeyPair>,
        locator: Option<&dyn ThirdPartyLocator>,
    ) -> Result<()> {
        if caveat.is_first_party() {
            let resolved = match &self.namespace {
                Some(ns) => ns.resolve_caveat(caveat),
                None => Namespace::new().resolve_caveat(caveat),
            };
            trace!(condition = %resolved.condition, "adding first-party caveat");
            self.raw.add_first_party_caveat(resolved.condition);
            return Ok(());
        }

        let key = key.ok_or_else(|| {
            BakeryError::CryptoError("no private key to encrypt third party caveat".to_string())
        })?;
        let mut location = caveat.location.unwrap_or_default();
        let mut condition = caveat.condition;

        let mut info = match decode_local_location(&location) {
            Some(info) => {
                if !condition.is_empty() {
                    return Err(BakeryError::InvalidFormat(
                        "cannot specify caveat condition in local third-party caveat".to_string(),
                    ));
                }
                location = LOCAL_LOCATION.to_string();
                condition = "true".to_string();
                info
            }
            None => {
                let locator = locator.ok_or_else(|| {
                    BakeryError::ThirdPartyNotFound(location.clone())
                        .note("no locator when adding third party caveat")
                })?;
                locator
                    .third_party_info(ctx, &location)
                    .await
                    .map_err(|e| {
                        e.note(format!("cannot find public key for location {location:?}"))
                    })?
            }
        };

        let root_key = random_bytes(CAVEAT_ROOT_KEY_LEN)?;
        // Encode for the oldest of the two parties.
        info.version = info.version.min(self.version);
        let encoded = encode_caveat(
            &condition,
            &root_key,
            &info,
            key,
            self.namespace.as_ref(),
        )?;

        let id = if info.version < Version::V3 {
            encoded
        } else {
            let id = self.new_caveat_id();
            self.caveat_data.insert(id.clone(), encoded);
            id
        };

        trace!(%location, version = %info.version, "adding third-party caveat");
        self.raw.add_third_party_caveat(&root_key, id, location)
    }

    /// Returns a short id for a new version 3 third-party caveat.
    ///
    /// The id is the caveat-id prefix (or a single version byte when there is
    /// none) followed by the first uvarint, counting from the number of
    /// stored caveats, that no existing third-party caveat uses.
    fn new_caveat_id(&self) -> Vec<u8> {
        let base = if self.caveat_id_prefix.is_empty() {
            vec![3u8]
        } else {
            self.caveat_id_prefix.clone()
        };

        // Terminates: there are only finitely many existing caveats to collide with.
        let mut n = self.caveat_data.len() as u64;
        loop {
            let id = append_uvarint(base.clone(), n);
            if !self.raw.third_party_caveats().any(|c| c.caveat_id == id) {
                return id;
            }
            n += 1;
        }
    }
}

fn append_uvarint(mut buf: Vec<u8>, mut n: u64) -> Vec<u8> {
    while n >= 0x80 {
        buf.push((n as u8) | 0x80);
        n >>= 7;
    }
    buf.push(n as u8);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_caveat;
    use crate::location::{ThirdPartyInfo, ThirdPartyStore, local_third_party_caveat};

    fn ns() -> Namespace {
        let mut ns = Namespace::legacy();
        ns.register("example.com/app", "app");
        ns
    }

    fn new_macaroon(version: Version) -> Macaroon {
        Macaroon::new(b"root", b"id", None::<String>, version, Some(ns())).unwrap()
    }

    #[test]
    fn test_new_rejects_future_version() {
        assert!(Macaroon::new(b"root", b"id", None::<String>, Version(4), None).is_err());
    }

    #[test]
    fn test_append_uvarint() {
        assert_eq!(append_uvarint(vec![], 0), vec![0]);
        assert_eq!(append_uvarint(vec![9], 127), vec![9, 127]);
        assert_eq!(append_uvarint(vec![], 300), vec![0xac, 0x02]);
    }

    #[tokio::test]
    async fn test_first_party_caveat_is_resolved() {
        let ctx = CancellationToken::new();
        let mut m = new_macaroon(Version::V3);

        m.add_caveat(
            &ctx,
            Caveat::first_party("allow read").with_namespace("example.com/app"),
            None,
            None,
        )
        .await
        .unwrap();
        m.add_caveat(&ctx, Caveat::declared("user", "bob"), None, None)
            .await
            .unwrap();

        assert_eq!(m.caveats()[0].caveat_id, b"app:allow read");
        assert_eq!(m.caveats()[1].caveat_id, b"declared user bob");
    }

    #[tokio::test]
    async fn test_first_party_caveat_without_namespace() {
        let ctx = CancellationToken::new();
        let mut m = Macaroon::new(b"root", b"id", None::<String>, Version::V3, None).unwrap();

        m.add_caveat(&ctx, Caveat::declared("user", "bob"), None, None)
            .await
            .unwrap();

        let condition = String::from_utf8(m.caveats()[0].caveat_id.clone()).unwrap();
        assert!(condition.starts_with("error "));
    }

    #[tokio::test]
    async fn test_third_party_caveat_requires_key() {
        let ctx = CancellationToken::new();
        let mut m = new_macaroon(Version::V3);

        let err = m
            .add_caveat(&ctx, Caveat::third_party("x", "https://auth"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BakeryError::CryptoError(_)));
    }

    #[tokio::test]
    async fn test_third_party_caveat_requires_locator() {
        let ctx = CancellationToken::new();
        let key = KeyPair::generate().unwrap();
        let mut m = new_macaroon(Version::V3);

        let err = m
            .add_caveat(&ctx, Caveat::third_party("x", "https://auth"), Some(&key), None)
            .await
            .unwrap_err();
        assert!(matches!(err.cause(), BakeryError::ThirdPartyNotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_location_is_noted() {
        let ctx = CancellationToken::new();
        let key = KeyPair::generate().unwrap();
        let store = ThirdPartyStore::new();
        let mut m = new_macaroon(Version::V3);

        let err = m
            .add_caveat(
                &ctx,
                Caveat::third_party("x", "https://auth"),
                Some(&key),
                Some(&store),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("cannot find public key for location"));
        assert_eq!(
            err.cause(),
            &BakeryError::ThirdPartyNotFound("https://auth".into())
        );
    }

    #[tokio::test]
    async fn test_v3_caveat_gets_short_id_and_caveat_data() {
        let ctx = CancellationToken::new();
        let first = KeyPair::generate().unwrap();
        let third = KeyPair::generate().unwrap();
        let store = ThirdPartyStore::new();
        store.add_info(
            "https://auth",
            ThirdPartyInfo {
                public_key: *third.public_key(),
                version: Version::V3,
            },
        );
        let mut m = new_macaroon(Version::V3);

        for _ in 0..2 {
            m.add_caveat(
                &ctx,
                Caveat::third_party("is-user", "https://auth"),
                Some(&first),
                Some(&store),
            )
            .await
            .unwrap();
        }

        assert_eq!(m.caveats()[0].caveat_id, vec![3, 0]);
        assert_eq!(m.caveats()[1].caveat_id, vec![3, 1]);

        let payload = m.caveat_data(&[3, 0]).unwrap();
        let info = decode_caveat(&third, payload).unwrap();
        assert_eq!(info.condition, b"is-user");
        assert_eq!(info.namespace, Some(ns()));
    }

    #[tokio::test]
    async fn test_caveat_id_prefix_is_used() {
        let ctx = CancellationToken::new();
        let first = KeyPair::generate().unwrap();
        let third = KeyPair::generate().unwrap();
        let mut m = new_macaroon(Version::V3);
        m.set_caveat_id_prefix(b"discharge-id".to_vec());

        m.add_caveat(
            &ctx,
            local_third_party_caveat(third.public_key(), Version::V3),
            Some(&first),
            None,
        )
        .await
        .unwrap();

        assert_eq!(m.caveats()[0].caveat_id, b"discharge-id\x00");
    }

    #[tokio::test]
    async fn test_older_third_party_gets_self_describing_id() {
        let ctx = CancellationToken::new();
        let first = KeyPair::generate().unwrap();
        let third = KeyPair::generate().unwrap();
        let mut m = new_macaroon(Version::V3);

        m.add_caveat(
            &ctx,
            local_third_party_caveat(third.public_key(), Version::V2),
            Some(&first),
            None,
        )
        .await
        .unwrap();

        let caveat = &m.caveats()[0];
        assert_eq!(caveat.location.as_deref(), Some(LOCAL_LOCATION));
        assert_eq!(m.caveat_data(&caveat.caveat_id), None);

        let info = decode_caveat(&third, &caveat.caveat_id).unwrap();
        assert_eq!(info.version, Version::V2);
        assert_eq!(info.condition, b"true");
    }

    #[tokio::test]
    async fn test_older_macaroon_caps_caveat_version() {
        let ctx = CancellationToken::new();
        let first = KeyPair::generate().unwrap();
        let third = KeyPair::generate().unwrap();
        let mut m = new_macaroon(Version::V1);

        m.add_caveat(
            &ctx,
            local_third_party_caveat(third.public_key(), Version::V3),
            Some(&first),
            None,
        )
        .await
        .unwrap();

        let info = decode_caveat(&third, &m.caveats()[0].caveat_id).unwrap();
        assert_eq!(info.version, Version::V1);
    }

    #[tokio::test]
    async fn test_local_caveat_rejects_condition() {
        let ctx = CancellationToken::new();
        let first = KeyPair::generate().unwrap();
        let mut caveat = local_third_party_caveat(first.public_key(), Version::V3);
        caveat.condition = "something".to_string();
        let mut m = new_macaroon(Version::V3);

        assert!(m.add_caveat(&ctx, caveat, Some(&first), None).await.is_err());
        assert!(m.caveats().is_empty());
    }
}
