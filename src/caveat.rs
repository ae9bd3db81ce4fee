use crate::condition::{COND_DECLARED, COND_ERROR, COND_NEED_DECLARED, STD_NAMESPACE, condition};
use serde::{Deserialize, Serialize};

/// A caveat as produced by checkers and consumed by [`Macaroon::add_caveat`].
///
/// Caveats without a location are first-party: their condition is checked by
/// the target service. Caveats with a location are third-party: their
/// condition is encrypted for the discharger at that location.
///
/// [`Macaroon::add_caveat`]: crate::Macaroon::add_caveat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caveat {
    /// The condition to check
    pub condition: String,

    /// URI of the namespace the condition belongs to (first-party only)
    pub namespace: Option<String>,

    /// Location of the third-party discharger
    pub location: Option<String>,
}

impl Caveat {
    /// Creates a first-party caveat outside any namespace
    pub fn first_party(condition: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            namespace: None,
            location: None,
        }
    }

    /// Creates a third-party caveat to be discharged at `location`
    pub fn third_party(condition: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            namespace: None,
            location: Some(location.into()),
        }
    }

    /// Creates a first-party caveat in the standard namespace
    pub fn standard(verb: &str, arg: &str) -> Self {
        Self::first_party(condition(verb, arg)).with_namespace(STD_NAMESPACE)
    }

    /// Creates a `declared` caveat asserting that attribute `key` has `value`.
    ///
    /// A key that is empty or contains a space cannot be declared; an
    /// [`error`](Self::error) caveat is returned instead.
    ///
    /// # Example
    /// ```
    /// use bakery::Caveat;
    ///
    /// assert_eq!(Caveat::declared("user", "alice").condition, "declared user alice");
    /// assert_eq!(Caveat::declared("user", "").condition, "declared user ");
    /// assert!(Caveat::declared("bad key", "x").condition.starts_with("error "));
    /// ```
    pub fn declared(key: &str, value: &str) -> Self {
        if key.is_empty() || key.contains(' ') {
            return Self::error(&format!("invalid caveat 'declared' key {key:?}"));
        }
        Self::standard(COND_DECLARED, &format!("{key} {value}"))
    }

    /// Wraps `caveat` so that its discharge must declare every attribute in `keys`.
    ///
    /// `caveat` must be third-party. Keys must be non-empty and free of
    /// commas and spaces.
    pub fn need_declared(caveat: Caveat, keys: &[&str]) -> Self {
        if caveat.is_first_party() {
            return Self::error("need-declared caveat is not third-party");
        }
        if keys.is_empty() {
            return Self::error("need-declared caveat with no required attributes");
        }
        if let Some(bad) = keys
            .iter()
            .find(|k| k.is_empty() || k.contains(',') || k.contains(' '))
        {
            return Self::error(&format!("need-declared caveat with invalid attribute {bad:?}"));
        }

        Self {
            condition: condition(
                COND_NEED_DECLARED,
                &format!("{} {}", keys.join(","), caveat.condition),
            ),
            namespace: caveat.namespace,
            location: caveat.location,
        }
    }

    /// Creates a caveat that always fails with `message`
    pub fn error(message: &str) -> Self {
        Self::standard(COND_ERROR, message)
    }

    pub fn with_namespace(mut self, uri: impl Into<String>) -> Self {
        self.namespace = Some(uri.into());
        self
    }

    /// Returns true if this is a first-party caveat
    pub fn is_first_party(&self) -> bool {
        self.location.as_deref().is_none_or(str::is_empty)
    }

    /// Returns true if this is a third-party caveat
    pub fn is_third_party(&self) -> bool {
        !self.is_first_party()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_party_caveat() {
        let caveat = Caveat::first_party("time-before 2030-01-01T00:00:00Z");
        assert!(caveat.is_first_party());
        assert!(!caveat.is_third_party());
        assert_eq!(caveat.namespace, None);
    }

    #[test]
    fn test_third_party_caveat() {
        let caveat = Caveat::third_party("is-authenticated-user", "https://auth.example.com");
        assert!(caveat.is_third_party());
        assert_eq!(caveat.location.as_deref(), Some("https://auth.example.com"));
    }

    #[test]
    fn test_empty_location_is_first_party() {
        let caveat = Caveat::third_party("x", "");
        assert!(caveat.is_first_party());
    }

    #[test]
    fn test_declared_caveat() {
        let caveat = Caveat::declared("user", "alice");
        assert_eq!(caveat.condition, "declared user alice");
        assert_eq!(caveat.namespace.as_deref(), Some(STD_NAMESPACE));
        assert!(caveat.is_first_party());
    }

    #[test]
    fn test_declared_invalid_key() {
        assert_eq!(
            Caveat::declared("", "x").condition,
            "error invalid caveat 'declared' key \"\""
        );
    }

    #[test]
    fn test_need_declared_wraps_third_party_caveat() {
        let inner = Caveat::third_party("is-member admins", "https://groups");
        let caveat = Caveat::need_declared(inner, &["user", "group"]);

        assert_eq!(caveat.condition, "need-declared user,group is-member admins");
        assert_eq!(caveat.location.as_deref(), Some("https://groups"));
    }

    #[test]
    fn test_need_declared_rejects_bad_keys() {
        let inner = Caveat::third_party("x", "https://groups");

        assert!(
            Caveat::need_declared(inner.clone(), &[])
                .condition
                .starts_with("error ")
        );
        assert!(
            Caveat::need_declared(inner, &["a,b"])
                .condition
                .starts_with("error ")
        );
    }

    #[test]
    fn test_need_declared_rejects_first_party_caveat() {
        let caveat = Caveat::need_declared(Caveat::first_party("is-ok"), &["user"]);

        assert_eq!(caveat.condition, "error need-declared caveat is not third-party");
        assert!(caveat.is_first_party());
    }
}
