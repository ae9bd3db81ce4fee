use crate::caveat::Caveat;
use crate::condition::{STD_NAMESPACE, condition_with_prefix};
use crate::{BakeryError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Maps checker namespace URIs to the short prefixes used in conditions.
///
/// A first party records its namespace in the third-party caveats it mints
/// so that dischargers produce conditions the first party can interpret.
///
/// The text form lists `uri:prefix` pairs separated by spaces, sorted by URI.
///
/// # Example
/// ```
/// use bakery::Namespace;
///
/// let mut ns = Namespace::new();
/// ns.register("std", "");
/// ns.register("example.com/app", "app");
///
/// assert_eq!(ns.to_string(), "example.com/app:app std:");
/// assert_eq!(ns.resolve("example.com/app"), Some("app"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespace {
    uri_to_prefix: BTreeMap<String, String>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// The namespace assumed for caveats encoded before namespaces existed:
    /// the standard namespace with an empty prefix.
    pub fn legacy() -> Self {
        let mut ns = Self::new();
        ns.register(STD_NAMESPACE, "");
        ns
    }

    /// Registers `uri` under `prefix`.
    ///
    /// The first registration of a URI wins; returns false if `uri` was
    /// already registered.
    pub fn register(&mut self, uri: impl Into<String>, prefix: impl Into<String>) -> bool {
        let uri = uri.into();
        if self.uri_to_prefix.contains_key(&uri) {
            return false;
        }
        self.uri_to_prefix.insert(uri, prefix.into());
        true
    }

    /// Returns the prefix registered for `uri`
    pub fn resolve(&self, uri: &str) -> Option<&str> {
        self.uri_to_prefix.get(uri).map(String::as_str)
    }

    /// Merges the registrations of `other` into this namespace
    pub fn merge(&mut self, other: &Namespace) {
        for (uri, prefix) in &other.uri_to_prefix {
            self.register(uri.clone(), prefix.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.uri_to_prefix.is_empty()
    }

    /// Rewrites a first-party caveat's condition with its namespace prefix.
    ///
    /// Third-party caveats and caveats without a namespace are returned as
    /// they are. A caveat in an unregistered namespace becomes an error
    /// caveat so that it can never be satisfied.
    pub fn resolve_caveat(&self, caveat: Caveat) -> Caveat {
        let Some(uri) = caveat.namespace.as_deref() else {
            return caveat;
        };
        if caveat.is_third_party() {
            return caveat;
        }

        let (prefix, mut resolved) = match self.resolve(uri) {
            Some(prefix) => (prefix.to_string(), caveat.clone()),
            None => {
                let err = Caveat::error(&format!(
                    "caveat {:?} in unregistered namespace {uri:?}",
                    caveat.condition
                ));
                let prefix = self.resolve(STD_NAMESPACE).unwrap_or_default().to_string();
                (prefix, err)
            }
        };

        resolved.condition = condition_with_prefix(&prefix, &resolved.condition);
        resolved.namespace = None;
        resolved
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (uri, prefix)) in self.uri_to_prefix.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{uri}:{prefix}")?;
        }
        Ok(())
    }
}

impl FromStr for Namespace {
    type Err = BakeryError;

    fn from_str(s: &str) -> Result<Self> {
        let mut ns = Namespace::new();
        for field in s.split_whitespace() {
            let (uri, prefix) = field.rsplit_once(':').ok_or_else(|| {
                BakeryError::InvalidFormat(format!("no colon in namespace field {field:?}"))
            })?;
            if uri.is_empty() {
                return Err(BakeryError::InvalidFormat(format!(
                    "empty URI in namespace field {field:?}"
                )));
            }
            if !ns.register(uri, prefix) {
                return Err(BakeryError::InvalidFormat(format!(
                    "duplicate URI {uri:?} in namespace"
                )));
            }
        }
        Ok(ns)
    }
}

impl Serialize for Namespace {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Namespace {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
