use crate::macaroon::Macaroon;
use crate::raw::RawMacaroon;
use crate::{BakeryError, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

fn to_msgpack<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec(value).map_err(|e| BakeryError::InvalidFormat(e.to_string()))
}

fn from_msgpack<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
    rmp_serde::from_slice(data).map_err(|e| BakeryError::DeserializationError(e.to_string()))
}

fn decode_base64(b64: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(b64.as_bytes())
        .map_err(|e| BakeryError::DeserializationError(e.to_string()))
}

impl RawMacaroon {
    /// Serializes this macaroon to JSON
    ///
    /// # Example
    /// ```
    /// use bakery::raw::RawMacaroon;
    ///
    /// let mut m = RawMacaroon::new(b"secret", b"my-identifier", Some("http://example.com/"));
    /// m.add_first_party_caveat("declared user alice");
    ///
    /// let json = m.to_json().unwrap();
    /// assert!(json.contains("identifier"));
    /// ```
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| BakeryError::InvalidFormat(e.to_string()))
    }

    /// Deserializes a macaroon from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| BakeryError::DeserializationError(e.to_string()))
    }

    /// Serializes this macaroon to MessagePack
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        to_msgpack(self)
    }

    /// Deserializes a macaroon from MessagePack
    pub fn from_msgpack(data: &[u8]) -> Result<Self> {
        from_msgpack(data)
    }

    /// Serializes this macaroon to URL-safe unpadded base64 over MessagePack,
    /// suitable for HTTP headers and cookies.
    ///
    /// # Example
    /// ```
    /// use bakery::raw::RawMacaroon;
    ///
    /// let original = RawMacaroon::new(b"secret", b"my-identifier", None::<String>);
    /// let b64 = original.to_base64().unwrap();
    ///
    /// assert_eq!(RawMacaroon::from_base64(&b64).unwrap(), original);
    /// ```
    pub fn to_base64(&self) -> Result<String> {
        Ok(URL_SAFE_NO_PAD.encode(self.to_msgpack()?))
    }

    /// Deserializes a macaroon from [`RawMacaroon::to_base64`] output
    pub fn from_base64(b64: &str) -> Result<Self> {
        Self::from_msgpack(&decode_base64(b64)?)
    }

    pub fn to_hex(&self) -> Result<String> {
        Ok(hex::encode(self.to_msgpack()?))
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let msgpack =
            hex::decode(hex_str).map_err(|e| BakeryError::DeserializationError(e.to_string()))?;
        Self::from_msgpack(&msgpack)
    }
}

/// A [`Macaroon`] keys its caveat data by binary caveat id, so it only has
/// binary encodings.
impl Macaroon {
    /// Serializes this macaroon, with its version, namespace and caveat data,
    /// to MessagePack
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        to_msgpack(self)
    }

    pub fn from_msgpack(data: &[u8]) -> Result<Self> {
        from_msgpack(data)
    }

    /// Serializes this macaroon to URL-safe unpadded base64 over MessagePack
    pub fn to_base64(&self) -> Result<String> {
        Ok(URL_SAFE_NO_PAD.encode(self.to_msgpack()?))
    }

    pub fn from_base64(b64: &str) -> Result<Self> {
        Self::from_msgpack(&decode_base64(b64)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;
    use crate::location::local_third_party_caveat;
    use crate::namespace::Namespace;
    use crate::version::Version;
    use tokio_util::sync::CancellationToken;

    fn raw_with_caveats() -> RawMacaroon {
        let mut m = RawMacaroon::new(b"secret", b"my-identifier", Some("http://example.com/"));
        m.add_first_party_caveat("declared user alice");
        m.add_third_party_caveat(b"caveat root key", b"caveat-id", "https://auth.example.com")
            .unwrap();
        m
    }

    #[test]
    fn test_raw_json_roundtrip() {
        let original = raw_with_caveats();

        let json = original.to_json().unwrap();
        assert_eq!(RawMacaroon::from_json(&json).unwrap(), original);
    }

    #[test]
    fn test_raw_msgpack_is_compact() {
        let m = raw_with_caveats();

        assert!(m.to_msgpack().unwrap().len() < m.to_json().unwrap().len());
    }

    #[test]
    fn test_raw_hex_roundtrip_still_verifies() {
        let original = raw_with_caveats();
        let mut plain = RawMacaroon::new(b"secret", b"plain", None::<String>);
        plain.add_first_party_caveat("time-before 2030-01-01T00:00:00Z");

        let decoded = RawMacaroon::from_hex(&plain.to_hex().unwrap()).unwrap();
        assert_eq!(
            decoded.verify_signature(b"secret", &[]).unwrap(),
            vec!["time-before 2030-01-01T00:00:00Z".to_string()]
        );
        assert_eq!(
            RawMacaroon::from_hex(&original.to_hex().unwrap()).unwrap(),
            original
        );
    }

    #[test]
    fn test_invalid_input() {
        assert!(RawMacaroon::from_json("not valid json").is_err());
        assert!(RawMacaroon::from_base64("!!!invalid base64!!!").is_err());
        assert!(RawMacaroon::from_hex("zzz").is_err());
        assert!(RawMacaroon::from_msgpack(&[0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn test_cross_format_incompatibility() {
        let json = raw_with_caveats().to_json().unwrap();

        assert!(RawMacaroon::from_msgpack(json.as_bytes()).is_err());
    }

    #[tokio::test]
    async fn test_macaroon_keeps_caveat_data() {
        let ctx = CancellationToken::new();
        let first = KeyPair::generate().unwrap();
        let third = KeyPair::generate().unwrap();
        let mut m = Macaroon::new(
            b"root",
            b"id",
            Some("https://svc"),
            Version::V3,
            Some(Namespace::legacy()),
        )
        .unwrap();
        m.add_caveat(
            &ctx,
            local_third_party_caveat(third.public_key(), Version::V3),
            Some(&first),
            None,
        )
        .await
        .unwrap();

        let decoded = Macaroon::from_base64(&m.to_base64().unwrap()).unwrap();

        assert_eq!(decoded, m);
        let id = &decoded.caveats()[0].caveat_id;
        assert!(decoded.caveat_data(id).is_some());
        assert_eq!(decoded.namespace(), Some(&Namespace::legacy()));
    }
}
