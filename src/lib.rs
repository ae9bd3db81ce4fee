pub mod caveat;
pub mod checker;
pub mod codec;
pub mod condition;
pub mod crypto;
pub mod discharge;
pub mod discharge_all;
pub mod error;
pub mod keys;
pub mod location;
pub mod macaroon;
pub mod namespace;
pub mod raw;
pub mod serialization;
pub mod version;

pub use caveat::Caveat;
pub use checker::{FirstPartyCaveatChecker, ThirdPartyCaveatChecker};
pub use codec::ThirdPartyCaveatInfo;
pub use discharge::{CaveatEncoding, DischargeParams, discharge};
pub use discharge_all::{DischargeAcquirer, discharge_all, discharge_all_with_key};
pub use error::BakeryError;
pub use keys::{KeyPair, PublicKey};
pub use location::{ThirdPartyInfo, ThirdPartyLocator};
pub use macaroon::Macaroon;
pub use namespace::Namespace;
pub use version::Version;

/// Result type for bakery operations
pub type Result<T> = std::result::Result<T, BakeryError>;
