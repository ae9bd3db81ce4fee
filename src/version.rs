use serde::{Deserialize, Serialize};
use std::fmt;

/// Bakery protocol version.
///
/// The version decides how third-party caveats are encoded and whether
/// macaroons carry a first-party namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub u32);

impl Version {
    /// Pre-bakery macaroons
    pub const V0: Version = Version(0);
    /// Caveats encoded as a base64 JSON envelope
    pub const V1: Version = Version(1);
    /// Binary caveat encoding, caveat id carries the whole encoding
    pub const V2: Version = Version(2);
    /// Binary caveat encoding with namespaces and short caveat ids
    pub const V3: Version = Version(3);
    /// The most recent version understood by this crate
    pub const LATEST: Version = Version::V3;
}

impl Default for Version {
    fn default() -> Self {
        Version::LATEST
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
