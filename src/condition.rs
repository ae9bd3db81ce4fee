//! Caveat condition grammar.
//!
//! A condition is a verb optionally followed by a single space and an
//! argument: `declared user alice` has verb `declared` and argument
//! `user alice`.

use crate::{BakeryError, Result};

/// URI of the standard checker namespace
pub const STD_NAMESPACE: &str = "std";

/// `declared <name> <value>`: the discharger asserts an attribute value
pub const COND_DECLARED: &str = "declared";

/// `need-declared <attrs> <condition>`: discharge `condition`, declaring every attribute in `attrs`
pub const COND_NEED_DECLARED: &str = "need-declared";

/// `error <message>`: a caveat that can never be satisfied
pub const COND_ERROR: &str = "error";

/// Splits a condition into its verb and argument.
///
/// A condition without a space is all verb with an empty argument.
///
/// # Example
/// ```
/// use bakery::condition::parse_caveat;
///
/// assert_eq!(parse_caveat("declared user alice").unwrap(), ("declared", "user alice"));
/// assert_eq!(parse_caveat("true").unwrap(), ("true", ""));
/// assert!(parse_caveat(" leading space").is_err());
/// ```
pub fn parse_caveat(condition: &str) -> Result<(&str, &str)> {
    if condition.is_empty() {
        return Err(BakeryError::InvalidFormat("empty caveat".to_string()));
    }

    match condition.find(' ') {
        None => Ok((condition, "")),
        Some(0) => Err(BakeryError::InvalidFormat(format!(
            "caveat starts with space character: {condition:?}"
        ))),
        Some(i) => Ok((&condition[..i], &condition[i + 1..])),
    }
}

/// Builds a condition from a verb and an argument.
///
/// An empty argument yields the bare verb.
pub fn condition(verb: &str, arg: &str) -> String {
    if arg.is_empty() {
        verb.to_string()
    } else {
        format!("{verb} {arg}")
    }
}

/// Prefixes a condition with a namespace prefix, as `prefix:condition`
pub fn condition_with_prefix(prefix: &str, condition: &str) -> String {
    if prefix.is_empty() {
        condition.to_string()
    } else {
        format!("{prefix}:{condition}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verb_and_argument() {
        let (verb, arg) = parse_caveat("need-declared a,b inner cond").unwrap();
        assert_eq!(verb, COND_NEED_DECLARED);
        assert_eq!(arg, "a,b inner cond");
    }

    #[test]
    fn test_parse_keeps_extra_spaces_in_argument() {
        let (verb, arg) = parse_caveat("declared b ").unwrap();
        assert_eq!(verb, "declared");
        assert_eq!(arg, "b ");
    }

    #[test]
    fn test_parse_empty_is_error() {
        assert!(parse_caveat("").is_err());
    }

    #[test]
    fn test_parse_leading_space_is_error() {
        assert!(parse_caveat(" x").is_err());
    }

    #[test]
    fn test_condition_builder() {
        assert_eq!(condition("true", ""), "true");
        assert_eq!(condition("declared", "user alice"), "declared user alice");
        assert_eq!(condition("declared", "user "), "declared user ");
    }

    #[test]
    fn test_condition_with_prefix() {
        assert_eq!(condition_with_prefix("", "declared a b"), "declared a b");
        assert_eq!(condition_with_prefix("app", "allow read"), "app:allow read");
    }
}
