use crate::crypto::{
    SIGNATURE_SIZE, bind_caveat, bind_for_request, bind_third_party_caveat, hmac_sha3, open, seal,
    signatures_equal,
};
use crate::{BakeryError, Result};
use serde::{Deserialize, Serialize};

/// A caveat as it sits in a macaroon's signature chain.
///
/// First-party caveats only carry their condition as the caveat id.
/// Third-party caveats also carry the verification id (the caveat root key
/// sealed under the chain signature) and the location of the discharger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCaveat {
    /// The caveat identifier (condition or encoded third-party caveat id)
    pub caveat_id: Vec<u8>,

    /// Sealed caveat root key, present for third-party caveats
    pub verification_key_id: Option<Vec<u8>>,

    /// Location of the third-party discharger
    pub location: Option<String>,
}

impl RawCaveat {
    pub fn first_party(caveat_id: impl Into<Vec<u8>>) -> Self {
        Self {
            caveat_id: caveat_id.into(),
            verification_key_id: None,
            location: None,
        }
    }

    pub fn third_party(
        caveat_id: impl Into<Vec<u8>>,
        verification_key_id: impl Into<Vec<u8>>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            caveat_id: caveat_id.into(),
            verification_key_id: Some(verification_key_id.into()),
            location: Some(location.into()),
        }
    }

    /// Returns true if this is a first-party caveat
    pub fn is_first_party(&self) -> bool {
        self.verification_key_id.is_none()
    }

    /// Returns true if this is a third-party caveat
    pub fn is_third_party(&self) -> bool {
        !self.is_first_party()
    }
}

/// A macaroon: a bearer token with embedded, attenuating caveats.
///
/// Signatures are chained HMAC-SHA3-256 values, so anyone holding a macaroon
/// can add caveats but nobody can remove them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMacaroon {
    /// Optional location hint for the target service
    pub location: Option<String>,

    /// Public identifier for this macaroon
    pub identifier: Vec<u8>,

    /// Caveats in the order they were added
    pub caveats: Vec<RawCaveat>,

    /// HMAC-SHA3-256 signature
    pub signature: [u8; SIGNATURE_SIZE],
}

impl RawMacaroon {
    /// Mints a new macaroon
    ///
    /// # Example
    /// ```
    /// use bakery::raw::RawMacaroon;
    ///
    /// let root_key = b"this is our super secret key; only we should know it";
    /// let m = RawMacaroon::new(root_key, b"we used our secret key", Some("http://mybank/"));
    /// assert!(m.is_unrestricted());
    /// ```
    pub fn new(
        root_key: &[u8],
        identifier: impl Into<Vec<u8>>,
        location: Option<impl Into<String>>,
    ) -> Self {
        let identifier = identifier.into();
        let signature = hmac_sha3(root_key, &identifier);

        Self {
            location: location.map(|l| l.into()),
            identifier,
            caveats: Vec::new(),
            signature,
        }
    }

    /// Adds a first-party caveat, binding its condition into the signature
    pub fn add_first_party_caveat(&mut self, condition: impl Into<Vec<u8>>) {
        let caveat_id = condition.into();
        self.signature = bind_caveat(&self.signature, &caveat_id);
        self.caveats.push(RawCaveat::first_party(caveat_id));
    }

    /// Adds a third-party caveat.
    ///
    /// `root_key` is the key the discharger will mint its discharge with. It
    /// is sealed under the current signature so that only a verifier who can
    /// recompute the chain recovers it.
    pub fn add_third_party_caveat(
        &mut self,
        root_key: &[u8],
        caveat_id: impl Into<Vec<u8>>,
        location: impl Into<String>,
    ) -> Result<()> {
        let caveat_id = caveat_id.into();
        let verification_key_id = seal(&self.signature, root_key)?;

        self.signature = bind_third_party_caveat(&self.signature, &verification_key_id, &caveat_id);
        self.caveats.push(RawCaveat::third_party(
            caveat_id,
            verification_key_id,
            location,
        ));
        Ok(())
    }

    /// Returns the number of caveats in this macaroon
    pub fn caveat_count(&self) -> usize {
        self.caveats.len()
    }

    /// Returns true if this macaroon has no caveats
    pub fn is_unrestricted(&self) -> bool {
        self.caveats.is_empty()
    }

    /// Returns the third-party caveats in order
    pub fn third_party_caveats(&self) -> impl Iterator<Item = &RawCaveat> {
        self.caveats.iter().filter(|c| c.is_third_party())
    }

    /// Binds a discharge macaroon to this macaroon's signature, so the
    /// discharge cannot be replayed alongside a different primary.
    pub fn bind_for_request(&self, discharge: &RawMacaroon) -> RawMacaroon {
        let mut bound = discharge.clone();
        bound.signature = bind_for_request(&self.signature, &discharge.signature);
        bound
    }

    /// Returns this macaroon followed by every discharge bound to it
    pub fn prepare_for_request(&self, discharges: Vec<RawMacaroon>) -> Vec<RawMacaroon> {
        let mut result = vec![self.clone()];
        result.extend(discharges.iter().map(|d| self.bind_for_request(d)));
        result
    }

    /// Verifies the signature chain of this macaroon and of the discharges
    /// needed for its third-party caveats.
    ///
    /// Discharges must already be bound to this macaroon. Every discharge
    /// must be used exactly once.
    ///
    /// # Returns
    /// The first-party conditions of this macaroon and of every discharge it
    /// relies on, in chain order. The caller checks them.
    pub fn verify_signature(
        &self,
        root_key: &[u8],
        discharges: &[RawMacaroon],
    ) -> Result<Vec<String>> {
        let mut used = vec![false; discharges.len()];
        let mut conditions = Vec::new();

        self.verify_chain(
            root_key,
            &self.signature,
            false,
            discharges,
            &mut used,
            &mut conditions,
        )?;

        if let Some(unused) = used.iter().position(|u| !u) {
            return Err(BakeryError::CaveatViolation(format!(
                "discharge macaroon {:?} was not used",
                String::from_utf8_lossy(&discharges[unused].identifier)
            )));
        }
        Ok(conditions)
    }

    /// Verifies the signatures and checks every first-party condition with `check`
    pub fn verify(
        &self,
        root_key: &[u8],
        mut check: impl FnMut(&str) -> Result<()>,
        discharges: &[RawMacaroon],
    ) -> Result<()> {
        for condition in self.verify_signature(root_key, discharges)? {
            check(&condition)?;
        }
        Ok(())
    }

    fn verify_chain(
        &self,
        root_key: &[u8],
        primary_signature: &[u8; SIGNATURE_SIZE],
        is_discharge: bool,
        discharges: &[RawMacaroon],
        used: &mut [bool],
        conditions: &mut Vec<String>,
    ) -> Result<()> {
        let mut signature = hmac_sha3(root_key, &self.identifier);

        for caveat in &self.caveats {
            match &caveat.verification_key_id {
                None => {
                    let condition = std::str::from_utf8(&caveat.caveat_id)
                        .map_err(|e| BakeryError::InvalidFormat(e.to_string()))?;
                    conditions.push(condition.to_string());
                    signature = bind_caveat(&signature, &caveat.caveat_id);
                }
                Some(vid) => {
                    let caveat_root_key = open(&signature, vid)
                        .map_err(|_| BakeryError::InvalidSignature)?;

                    let index = discharges
                        .iter()
                        .enumerate()
                        .position(|(i, d)| !used[i] && d.identifier == caveat.caveat_id)
                        .ok_or_else(|| {
                            BakeryError::CaveatViolation(format!(
                                "Missing discharge macaroon for caveat: {}",
                                String::from_utf8_lossy(&caveat.caveat_id)
                            ))
                        })?;
                    used[index] = true;

                    discharges[index].verify_chain(
                        &caveat_root_key,
                        primary_signature,
                        true,
                        discharges,
                        used,
                        conditions,
                    )?;

                    signature = bind_third_party_caveat(&signature, vid, &caveat.caveat_id);
                }
            }
        }

        let expected = if is_discharge {
            bind_for_request(primary_signature, &signature)
        } else {
            signature
        };

        if !signatures_equal(&expected, &self.signature) {
            return Err(BakeryError::InvalidSignature);
        }
        Ok(())
    }
}
