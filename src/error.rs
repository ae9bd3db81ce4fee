use thiserror::Error;

/// Errors that can occur when minting, discharging or verifying macaroons
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BakeryError {
    /// The macaroon's signature is invalid
    #[error("Invalid macaroon signature")]
    InvalidSignature,

    /// A caveat condition was violated
    #[error("Caveat violation: {0}")]
    CaveatViolation(String),

    /// The checker does not understand this kind of caveat.
    ///
    /// Fallback checkers rely on this class to try the next member, so
    /// checkers should return it rather than a violation when a condition
    /// is outside their vocabulary.
    #[error("Caveat not recognized: {0}")]
    CaveatNotRecognized(String),

    /// The third-party caveat could not be decoded or decrypted
    #[error("discharger cannot decode caveat id: {0}")]
    DecodeFailed(#[source] Box<BakeryError>),

    /// A need-declared condition or one of its declarations is malformed
    #[error("{0}")]
    MalformedNeedDeclared(String),

    /// A caveat returned by a checker could not be attached to the discharge
    #[error("could not add caveat: {0}")]
    AddCaveatFailed(#[source] Box<BakeryError>),

    /// No third party is known at the given location
    #[error("Third party not found for location {0:?}")]
    ThirdPartyNotFound(String),

    /// Failed to deserialize a macaroon or caveat
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// The data format is invalid
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Cryptographic operation failed
    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    /// Invalid key length
    #[error("Invalid key length")]
    InvalidKeyLength,

    /// The operating system could not supply random bytes
    #[error("Random source failure: {0}")]
    RandomSource(String),

    /// The operation observed cancellation of its context
    #[error("Operation cancelled")]
    Cancelled,

    /// Another error with added context
    #[error("{note}: {source}")]
    Noted {
        note: String,
        #[source]
        source: Box<BakeryError>,
    },
}

impl BakeryError {
    /// Wraps this error with a note, keeping it reachable through [`cause`](Self::cause)
    pub fn note(self, note: impl Into<String>) -> Self {
        BakeryError::Noted {
            note: note.into(),
            source: Box::new(self),
        }
    }

    /// Returns the error underneath any notes
    pub fn cause(&self) -> &BakeryError {
        let mut err = self;
        while let BakeryError::Noted { source, .. } = err {
            err = source;
        }
        err
    }

    /// Returns true if the underlying error is [`BakeryError::CaveatNotRecognized`]
    pub fn is_caveat_not_recognized(&self) -> bool {
        matches!(self.cause(), BakeryError::CaveatNotRecognized(_))
    }

    pub(crate) fn decode_failed(cause: BakeryError) -> Self {
        BakeryError::DecodeFailed(Box::new(cause))
    }

    pub(crate) fn add_caveat_failed(cause: BakeryError) -> Self {
        BakeryError::AddCaveatFailed(Box::new(cause))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cause_strips_notes() {
        let err = BakeryError::CaveatNotRecognized("foo".to_string())
            .note("first")
            .note("second");

        assert_eq!(
            err.cause(),
            &BakeryError::CaveatNotRecognized("foo".to_string())
        );
        assert!(err.is_caveat_not_recognized());
    }

    #[test]
    fn test_note_display() {
        let err = BakeryError::ThirdPartyNotFound("https://auth".to_string())
            .note("cannot find public key");

        assert_eq!(
            err.to_string(),
            "cannot find public key: Third party not found for location \"https://auth\""
        );
    }

    #[test]
    fn test_tagged_wrappers_are_not_notes() {
        let err = BakeryError::add_caveat_failed(BakeryError::InvalidKeyLength);

        assert_eq!(err.cause(), &err);
        assert!(!err.is_caveat_not_recognized());
        assert_eq!(err.to_string(), "could not add caveat: Invalid key length");

        let err = BakeryError::decode_failed(BakeryError::CryptoError("bad".into()));
        assert!(err.to_string().starts_with("discharger cannot decode caveat id"));
    }
}
